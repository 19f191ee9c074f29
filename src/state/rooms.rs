//! Room manager.
//!
//! A room is created at match time with its two participants fixed and the
//! requester already joined. Status follows occupancy: one member is
//! waiting, two is active, zero closes the room and drops it.

use super::ConnId;
use std::collections::HashMap;
use supportline_proto::{Role, names_eq};

/// Occupancy-derived room status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    WaitingForSecondMember,
    Active,
    Closed,
}

impl RoomStatus {
    fn from_occupancy(n: usize) -> Self {
        match n {
            0 => Self::Closed,
            1 => Self::WaitingForSecondMember,
            _ => Self::Active,
        }
    }
}

/// One of the two users a room was allocated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Connection that last acted for this participant.
    pub conn: ConnId,
    pub name: Option<String>,
    pub role: Role,
}

impl Participant {
    fn is(&self, conn: &ConnId, name: Option<&str>) -> bool {
        if &self.conn == conn {
            return true;
        }
        matches!((self.name.as_deref(), name), (Some(mine), Some(theirs)) if names_eq(mine, theirs))
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub participants: [Participant; 2],
    members: Vec<ConnId>,
    /// Which participants have joined at least once.
    seated: [bool; 2],
}

impl Room {
    pub fn occupancy(&self) -> usize {
        self.members.len()
    }

    pub fn status(&self) -> RoomStatus {
        RoomStatus::from_occupancy(self.members.len())
    }

    pub fn members(&self) -> &[ConnId] {
        &self.members
    }

    pub fn is_member(&self, conn: &ConnId) -> bool {
        self.members.contains(conn)
    }

    fn participant_index(&self, conn: &ConnId, name: Option<&str>) -> Option<usize> {
        self.participants.iter().position(|p| p.is(conn, name))
    }

    /// Participants that are currently members.
    pub fn joined(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| self.members.contains(&p.conn))
    }

    /// Participants that were matched into the room but never joined it.
    pub fn waiting(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .zip(self.seated)
            .filter_map(|(p, seated)| (!seated).then_some(p))
    }

    /// The participant that is not `conn`/`name`.
    pub fn other_participant(&self, conn: &ConnId, name: Option<&str>) -> Option<&Participant> {
        let index = self.participants.iter().position(|p| p.is(conn, name))?;
        self.participants.get(1 - index)
    }
}

/// Why a join was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    UnknownRoom,
    NotParticipant,
    Full,
}

/// State after a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub occupancy: usize,
    /// Whether the connection was not already a member.
    pub newly_joined: bool,
    /// Members other than the joiner.
    pub others: Vec<ConnId>,
    pub status: RoomStatus,
}

/// State after a leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Left {
    pub occupancy: usize,
    pub remaining: Vec<ConnId>,
    pub status: RoomStatus,
    /// Participants that never joined a room this leave closed.
    pub stranded: Vec<Participant>,
}

#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: HashMap<String, Room>,
    current: HashMap<ConnId, String>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a room for a matched pair, with `first` auto-joined.
    ///
    /// If `first` was a member of another room it leaves that room; the
    /// returned value describes that leave.
    pub fn create(
        &mut self,
        id: String,
        first: Participant,
        second: Participant,
    ) -> Option<(String, Left)> {
        let previous = self.current.get(&first.conn).cloned();
        let left = previous.and_then(|old| {
            let left = self.leave(&old, &first.conn)?;
            Some((old, left))
        });

        self.current.insert(first.conn.clone(), id.clone());
        let room = Room {
            id: id.clone(),
            members: vec![first.conn.clone()],
            participants: [first, second],
            seated: [true, false],
        };
        self.rooms.insert(id, room);
        crate::metrics::set_active_rooms(self.rooms.len());
        left
    }

    /// Add `conn` to the room's members.
    ///
    /// Only the two participants may join; `name` lets a participant rejoin
    /// from a new connection. Joining twice is a no-op.
    pub fn join(
        &mut self,
        room_id: &str,
        conn: &ConnId,
        name: Option<&str>,
    ) -> Result<Joined, JoinError> {
        let room = self.rooms.get_mut(room_id).ok_or(JoinError::UnknownRoom)?;
        let index = room
            .participant_index(conn, name)
            .ok_or(JoinError::NotParticipant)?;
        let stale = std::mem::replace(&mut room.participants[index].conn, conn.clone());

        // A participant reconnecting under the same name replaces the old
        // connection instead of occupying a second seat.
        if &stale != conn && room.members.contains(&stale) {
            room.members.retain(|m| m != &stale);
            self.current.remove(&stale);
        }

        let newly_joined = !room.members.contains(conn);
        if newly_joined {
            if room.members.len() >= 2 {
                return Err(JoinError::Full);
            }
            room.members.push(conn.clone());
        }
        room.seated[index] = true;

        let joined = Joined {
            occupancy: room.members.len(),
            newly_joined,
            others: room.members.iter().filter(|m| *m != conn).cloned().collect(),
            status: room.status(),
        };
        self.current.insert(conn.clone(), room_id.to_string());
        Ok(joined)
    }

    /// Remove `conn` from the room; an emptied room is discarded.
    ///
    /// Returns `None` for unknown rooms and non-members.
    pub fn leave(&mut self, room_id: &str, conn: &ConnId) -> Option<Left> {
        let room = self.rooms.get_mut(room_id)?;
        if !room.is_member(conn) {
            return None;
        }
        room.members.retain(|m| m != conn);
        if self.current.get(conn).is_some_and(|r| r == room_id) {
            self.current.remove(conn);
        }

        let status = room.status();
        let stranded = match status {
            RoomStatus::Closed => room.waiting().cloned().collect(),
            _ => Vec::new(),
        };
        let left = Left {
            occupancy: room.members.len(),
            remaining: room.members.clone(),
            status,
            stranded,
        };
        if left.status == RoomStatus::Closed {
            self.rooms.remove(room_id);
            crate::metrics::set_active_rooms(self.rooms.len());
        }
        Some(left)
    }

    /// Discard a room regardless of occupancy.
    pub fn remove(&mut self, room_id: &str) -> Option<Room> {
        let room = self.rooms.remove(room_id)?;
        for member in &room.members {
            if self.current.get(member).is_some_and(|r| r == room_id) {
                self.current.remove(member);
            }
        }
        crate::metrics::set_active_rooms(self.rooms.len());
        Some(room)
    }

    /// Discard every room `conn` was matched into but never joined.
    pub fn abandon(&mut self, conn: &ConnId) -> Vec<Room> {
        let ids: Vec<String> = self
            .rooms
            .values()
            .filter(|room| room.waiting().any(|p| &p.conn == conn))
            .map(|room| room.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// The room `conn` is currently a member of.
    pub fn room_of(&self, conn: &ConnId) -> Option<&str> {
        self.current.get(conn).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }
}
