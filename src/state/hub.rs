//! The Hub - central shared state for the matchmaker.
//!
//! Holds the connection registry, the match queue, the room manager and a
//! handle to the user directory. The queue and rooms sit behind
//! synchronous locks that are never held across an `.await`: every
//! operation here mutates under the lock, releases it, and only then
//! pushes notifications onto the affected connections' outbound queues.

use super::queue::{MatchQueue, QueueEntry, QueueKey};
use super::registry::ConnectionRegistry;
use super::rooms::{JoinError, Left, Participant, Room, RoomManager, RoomStatus};
use super::{ConnId, ConnIdGenerator};
use crate::config::Config;
use crate::directory::Directory;
use crate::error::HandlerError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use supportline_proto::{CategorySet, ChatPayload, Counterpart, DisconnectReason, Role, ServerEvent};
use tracing::{debug, info, warn};

/// This server's identity information.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
}

/// Settings handlers read on every event.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Directory candidates fetched per match request.
    pub candidate_limit: u32,
    /// Maximum chat text length in bytes.
    pub max_message_bytes: usize,
    /// Capacity of each outbound queue.
    pub outbound_queue: usize,
}

/// Why a member left a room.
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveCause {
    /// An explicit `leaveRoom`.
    Voluntary,
    /// The connection went away.
    Disconnected(DisconnectReason),
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entered {
    pub occupancy: usize,
    /// Participants left without a room because the joiner's previous
    /// room closed before they arrived.
    pub released: Vec<Participant>,
}

/// In-memory counts served by `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubCounts {
    pub queued: usize,
    pub rooms: usize,
    pub connections: usize,
}

pub struct Hub {
    pub server_info: ServerInfo,
    pub connections: ConnectionRegistry,
    pub settings: HubSettings,
    queue: Mutex<MatchQueue>,
    rooms: Mutex<RoomManager>,
    directory: Arc<dyn Directory>,
    conn_ids: ConnIdGenerator,
}

impl Hub {
    pub fn new(config: &Config, directory: Arc<dyn Directory>) -> Self {
        Self {
            server_info: ServerInfo {
                name: config.server.name.clone(),
            },
            connections: ConnectionRegistry::new(),
            settings: HubSettings {
                candidate_limit: config.matching.candidate_limit,
                max_message_bytes: config.limits.max_message_bytes,
                outbound_queue: config.limits.outbound_queue,
            },
            queue: Mutex::new(MatchQueue::new()),
            rooms: Mutex::new(RoomManager::new()),
            directory,
            conn_ids: ConnIdGenerator::default(),
        }
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub fn next_conn_id(&self) -> ConnId {
        self.conn_ids.next()
    }

    pub fn counts(&self) -> HubCounts {
        HubCounts {
            queued: self.queue.lock().len(),
            rooms: self.rooms.lock().len(),
            connections: self.connections.len(),
        }
    }

    // ------------------------------------------------------------------
    // Match queue
    // ------------------------------------------------------------------

    /// Queue a request, replacing any earlier one for the same identity.
    pub fn enqueue(&self, entry: QueueEntry) {
        let mut queue = self.queue.lock();
        let key = entry.key.clone();
        if queue.enqueue(entry) {
            debug!(?key, "replaced queued match request");
        }
        crate::metrics::set_queue_depth(queue.len());
    }

    /// Take the oldest live compatible entry off the queue.
    ///
    /// Entries whose connection has gone away are discarded on the way.
    pub fn take_queued_match(
        &self,
        requester: &QueueKey,
        role: Role,
        categories: &CategorySet,
    ) -> Option<QueueEntry> {
        let mut queue = self.queue.lock();
        let found = loop {
            let entry = queue.take_first_match(requester, role, categories)?;
            if self.connections.contains(&entry.conn) {
                break entry;
            }
            debug!(conn = %entry.conn, "discarding queue entry of a closed connection");
        };
        crate::metrics::set_queue_depth(queue.len());
        Some(found)
    }

    /// Return a taken entry to the head of the queue.
    pub fn restore_queued(&self, entry: QueueEntry) {
        let mut queue = self.queue.lock();
        queue.restore(entry);
        crate::metrics::set_queue_depth(queue.len());
    }

    /// Drop every queue entry belonging to this connection or name.
    pub fn dequeue(&self, conn: &ConnId, name: Option<&str>) -> bool {
        let mut queue = self.queue.lock();
        let mut removed = queue.remove_conn(conn) > 0;
        if name.is_some() {
            removed |= queue.remove(&QueueKey::for_requester(conn, name)).is_some();
        }
        crate::metrics::set_queue_depth(queue.len());
        removed
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    pub fn room_of(&self, conn: &ConnId) -> Option<String> {
        self.rooms.lock().room_of(conn).map(str::to_string)
    }

    /// Current members of a room, empty if it does not exist.
    pub fn room_members(&self, room_id: &str) -> Vec<ConnId> {
        self.rooms
            .lock()
            .get(room_id)
            .map(|room| room.members().to_vec())
            .unwrap_or_default()
    }

    /// Commit a match: allocate a room with the requester joined, clear
    /// both identities from the queue and tell both sides.
    pub fn open_room(
        &self,
        requester: Participant,
        counterpart: Participant,
        common_categories: CategorySet,
    ) -> String {
        let room_id = uuid::Uuid::new_v4().simple().to_string();

        {
            let mut queue = self.queue.lock();
            for p in [&requester, &counterpart] {
                queue.remove_conn(&p.conn);
                if p.name.is_some() {
                    queue.remove(&QueueKey::for_requester(&p.conn, p.name.as_deref()));
                }
            }
            crate::metrics::set_queue_depth(queue.len());
        }

        let previous = self.rooms.lock().create(
            room_id.clone(),
            requester.clone(),
            counterpart.clone(),
        );
        if let Some((old_room, left)) = previous {
            self.announce_leave(&old_room, &requester.conn, &LeaveCause::Voluntary, &left);
        }

        info!(
            room = %room_id,
            requester = %requester.conn,
            counterpart = %counterpart.conn,
            "room allocated"
        );

        for (to, other) in [(&requester, &counterpart), (&counterpart, &requester)] {
            self.connections.send_control(
                &to.conn,
                ServerEvent::MatchFound {
                    room_id: room_id.clone(),
                    matched_with: Counterpart {
                        name: other.name.clone(),
                        role: other.role,
                    },
                    common_categories: common_categories.clone(),
                },
            );
        }
        self.connections.send_control(
            &requester.conn,
            ServerEvent::RoomJoined {
                room_id: room_id.clone(),
                users_in_room: 1,
            },
        );

        room_id
    }

    /// Add a connection to a room and broadcast occupancy.
    ///
    /// Unknown rooms are a logged no-op and yield `Ok(None)`.
    pub fn join_room(
        &self,
        room_id: &str,
        conn: &ConnId,
        name: Option<&str>,
    ) -> Result<Option<Entered>, HandlerError> {
        let (joined, previous) = {
            let mut rooms = self.rooms.lock();
            let current = rooms.room_of(conn).map(str::to_string);
            let joined = rooms.join(room_id, conn, name);
            let previous = match (&joined, current) {
                (Ok(_), Some(current)) if current != room_id => {
                    rooms.leave(&current, conn).map(|left| (current, left))
                }
                _ => None,
            };
            (joined, previous)
        };

        let released = match previous {
            Some((old_room, left)) => {
                self.announce_leave(&old_room, conn, &LeaveCause::Voluntary, &left);
                left.stranded
            }
            None => Vec::new(),
        };

        let joined = match joined {
            Ok(joined) => joined,
            Err(JoinError::UnknownRoom) => {
                warn!(room = %room_id, %conn, "join for unknown room ignored");
                return Ok(None);
            }
            Err(JoinError::NotParticipant) => {
                return Err(HandlerError::NotParticipant(room_id.to_string()));
            }
            Err(JoinError::Full) => return Err(HandlerError::RoomFull(room_id.to_string())),
        };

        self.connections.send_control(
            conn,
            ServerEvent::RoomJoined {
                room_id: room_id.to_string(),
                users_in_room: joined.occupancy,
            },
        );

        if joined.newly_joined {
            for other in &joined.others {
                self.connections.send_control(
                    other,
                    ServerEvent::UserJoinedRoom {
                        room_id: room_id.to_string(),
                        users_in_room: joined.occupancy,
                        user_name: name.map(str::to_string),
                    },
                );
            }
            if joined.status == RoomStatus::Active {
                info!(room = %room_id, "room active");
                for member in joined.others.iter().chain(std::iter::once(conn)) {
                    self.connections.send_control(
                        member,
                        ServerEvent::RoomReady {
                            room_id: room_id.to_string(),
                            users_in_room: joined.occupancy,
                        },
                    );
                }
            }
        }

        Ok(Some(Entered {
            occupancy: joined.occupancy,
            released,
        }))
    }

    /// Remove a connection from a room and tell whoever remains.
    ///
    /// Unknown rooms and non-members are a logged no-op.
    pub fn leave_room(&self, room_id: &str, conn: &ConnId, cause: LeaveCause) -> Option<Left> {
        let left = self.rooms.lock().leave(room_id, conn);
        let Some(left) = left else {
            debug!(room = %room_id, %conn, "leave for unknown room or non-member ignored");
            return None;
        };
        self.announce_leave(room_id, conn, &cause, &left);
        Some(left)
    }

    fn announce_leave(&self, room_id: &str, conn: &ConnId, cause: &LeaveCause, left: &Left) {
        let (disconnected, reason, reason_code) = match cause {
            LeaveCause::Voluntary => (false, None, None),
            LeaveCause::Disconnected(reason) => {
                (true, Some(reason.describe().to_string()), Some(reason.kind()))
            }
        };

        for member in &left.remaining {
            self.connections.send_control(
                member,
                ServerEvent::UserLeftRoom {
                    room_id: room_id.to_string(),
                    users_in_room: left.occupancy,
                    disconnected,
                    reason: reason.clone(),
                    reason_code,
                },
            );
        }

        if left.status == RoomStatus::Closed {
            info!(room = %room_id, "room closed");
            let closed = ServerEvent::RoomClosed {
                room_id: room_id.to_string(),
            };
            if !disconnected {
                self.connections.send_control(conn, closed.clone());
            }
            for participant in &left.stranded {
                debug!(
                    room = %room_id,
                    conn = %participant.conn,
                    "room closed before participant joined"
                );
                self.connections.send_control(&participant.conn, closed.clone());
            }
        }
    }

    /// Close every room `conn` was matched into but never joined, telling
    /// the member waiting there.
    ///
    /// Returns the participants left without a room.
    pub fn abandon_matches(&self, conn: &ConnId, reason: &DisconnectReason) -> Vec<Participant> {
        let abandoned = self.rooms.lock().abandon(conn);

        let mut released = Vec::new();
        for room in abandoned {
            info!(room = %room.id, %conn, "matched user gone before joining, room closed");
            for member in room.members() {
                self.connections.send_control(
                    member,
                    ServerEvent::UserLeftRoom {
                        room_id: room.id.clone(),
                        users_in_room: room.occupancy(),
                        disconnected: true,
                        reason: Some(reason.describe().to_string()),
                        reason_code: Some(reason.kind()),
                    },
                );
                self.connections.send_control(
                    member,
                    ServerEvent::RoomClosed {
                        room_id: room.id.clone(),
                    },
                );
            }
            released.extend(room.joined().cloned());
        }
        released
    }

    /// Put participants dropped from a closed room back in the pool.
    pub async fn release(&self, participants: &[Participant]) {
        let names: Vec<&str> = participants
            .iter()
            .filter_map(|p| p.name.as_deref())
            .collect();
        if names.is_empty() {
            return;
        }
        if let Err(e) = self.directory.set_available(&names, true).await {
            warn!(error = %e, "failed to release participants of a closed room");
        }
    }

    /// Tear down a matched room at a participant's request.
    ///
    /// Both participants are told; the removed room is returned so the
    /// caller can reset availability.
    pub fn decline_room(
        &self,
        room_id: &str,
        conn: &ConnId,
        name: Option<&str>,
    ) -> Result<Option<Room>, HandlerError> {
        let room = {
            let mut rooms = self.rooms.lock();
            let Some(room) = rooms.get(room_id) else {
                warn!(room = %room_id, %conn, "decline for unknown room ignored");
                return Ok(None);
            };
            if room.other_participant(conn, name).is_none() {
                return Err(HandlerError::NotParticipant(room_id.to_string()));
            }
            rooms.remove(room_id)
        };
        let Some(room) = room else { return Ok(None) };

        info!(room = %room_id, %conn, "match declined");

        let mut notified = vec![conn.clone()];
        self.connections.send_control(
            conn,
            ServerEvent::MatchDeclined {
                room_id: room_id.to_string(),
                by_you: true,
            },
        );
        let others = room
            .other_participant(conn, name)
            .map(|p| p.conn.clone())
            .into_iter()
            .chain(room.members().iter().cloned());
        for other in others {
            if notified.contains(&other) {
                continue;
            }
            self.connections.send_control(
                &other,
                ServerEvent::MatchDeclined {
                    room_id: room_id.to_string(),
                    by_you: false,
                },
            );
            notified.push(other);
        }

        Ok(Some(room))
    }

    // ------------------------------------------------------------------
    // Relay
    // ------------------------------------------------------------------

    /// Forward a chat payload to every other member of the room.
    ///
    /// Returns the number of recipients. Unknown rooms yield `Ok(0)`.
    pub fn relay(
        &self,
        room_id: &str,
        sender: &ConnId,
        payload: ChatPayload,
    ) -> Result<usize, HandlerError> {
        let size = payload.text.len();
        if size > self.settings.max_message_bytes {
            return Err(HandlerError::MessageTooLarge(
                size,
                self.settings.max_message_bytes,
            ));
        }

        let recipients: Vec<ConnId> = {
            let rooms = self.rooms.lock();
            let Some(room) = rooms.get(room_id) else {
                debug!(room = %room_id, %sender, "message for unknown room dropped");
                return Ok(0);
            };
            if !room.is_member(sender) {
                return Err(HandlerError::NotInRoom(room_id.to_string()));
            }
            room.members()
                .iter()
                .filter(|m| *m != sender)
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        for recipient in &recipients {
            if self
                .connections
                .send_relay(recipient, ServerEvent::ReceiveMessage(payload.clone()))
            {
                delivered += 1;
            }
        }
        crate::metrics::record_relayed(delivered);
        Ok(delivered)
    }
}
