//! Matchmaking handlers.
//!
//! `findMatch` searches the directory first and the match queue second,
//! then either opens a room or queues the requester. Every await on the
//! directory may observe a world that has moved on, so the match is only
//! committed once [`Directory::claim_pair`] has flipped both availability
//! flags; whoever loses that compare-and-set is re-queued.

use super::connection::bind_identity;
use super::{Context, Handler};
use crate::directory::{Claim, Directory};
use crate::error::{HandlerError, HandlerResult};
use crate::state::{ConnId, LeaveCause, Participant, QueueEntry, QueueKey};
use async_trait::async_trait;
use supportline_proto::{CategorySet, ClientEvent, Role, ServerEvent};
use tracing::{debug, info, warn};

const SEARCHING: &str = "Searching for a match...";

/// Where a counterpart came from, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Directory,
    Queue,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Queue => "queue",
        }
    }
}

/// A match request after identity resolution.
struct Request {
    conn: ConnId,
    name: Option<String>,
    role: Role,
    categories: CategorySet,
}

impl Request {
    fn key(&self) -> QueueKey {
        QueueKey::for_requester(&self.conn, self.name.as_deref())
    }

    fn participant(&self) -> Participant {
        Participant {
            conn: self.conn.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }

    fn into_queue_entry(self) -> QueueEntry {
        QueueEntry::new(self.conn, self.name, self.role, self.categories)
    }
}

/// Handler for `findMatch`.
pub struct FindMatchHandler;

#[async_trait]
impl Handler for FindMatchHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::FindMatch {
            role,
            categories,
            name,
        } = event
        else {
            return Ok(());
        };

        let role = role.ok_or(HandlerError::RoleRequired)?;

        // The bound name always wins over the payload name.
        let name = match ctx.name() {
            Some(bound) => Some(bound),
            None => match name.as_deref().filter(|n| !n.trim().is_empty()) {
                Some(requested) => Some(bind_identity(ctx, requested).await?),
                None => None,
            },
        };

        if let Some(room_id) = ctx.hub.room_of(ctx.conn) {
            if ctx.hub.room_members(&room_id).len() >= 2 {
                return Err(HandlerError::AlreadyInRoom(room_id));
            }
            // A room still waiting for its counterpart is given up.
            if let Some(left) = ctx.hub.leave_room(&room_id, ctx.conn, LeaveCause::Voluntary) {
                ctx.hub.release(&left.stranded).await;
            }
        }

        let request = Request {
            conn: ctx.conn.clone(),
            name,
            role,
            categories,
        };
        find_match(ctx, request).await
    }
}

async fn find_match(ctx: &Context<'_>, request: Request) -> HandlerResult {
    let hub = ctx.hub;
    let directory = hub.directory();
    let opposite = request.role.opposite();

    // An earlier request from the same identity is superseded.
    hub.dequeue(&request.conn, request.name.as_deref());

    if let Some(name) = &request.name {
        directory
            .set_profile(name, request.role, &request.categories)
            .await?;
    }

    // 1. Directory: most recently active, reachable, available user.
    let candidates = directory
        .find_candidates(
            opposite,
            &request.categories,
            request.name.as_deref(),
            hub.settings.candidate_limit,
        )
        .await?;

    let chosen = candidates.into_iter().find_map(|candidate| {
        let conn = hub.connections.lookup_name(&candidate.name)?;
        if conn == request.conn {
            return None;
        }
        let common = request.categories.intersection(&candidate.categories);
        Some((
            Participant {
                conn,
                name: Some(candidate.name),
                role: candidate.role,
            },
            common,
        ))
    });

    if let Some((counterpart, common)) = chosen {
        debug!(counterpart = ?counterpart.name, "directory candidate chosen");
        return commit(ctx, request, counterpart, common, Source::Directory, None).await;
    }

    // 2. Queue: first compatible waiting request in insertion order.
    if let Some(entry) = hub.take_queued_match(&request.key(), opposite, &request.categories) {
        debug!(
            counterpart = %entry.conn,
            waited_ms = entry.enqueued_at.elapsed().as_millis() as u64,
            "queued request chosen"
        );
        let common = request.categories.intersection(&entry.categories);
        let counterpart = Participant {
            conn: entry.conn.clone(),
            name: entry.name.clone(),
            role: entry.role,
        };
        return commit(ctx, request, counterpart, common, Source::Queue, Some(entry)).await;
    }

    // 3. Nobody: wait.
    enqueue(ctx, request);
    Ok(())
}

fn enqueue(ctx: &Context<'_>, request: Request) {
    debug!(conn = %request.conn, role = %request.role, "queued for matching");
    ctx.hub.enqueue(request.into_queue_entry());
    ctx.reply(ServerEvent::SearchingForMatch {
        message: SEARCHING.to_string(),
    });
}

/// Linearize the match on the directory, then open the room.
///
/// `taken` is the queue entry the counterpart came from, restored if the
/// requester turns out to have been matched elsewhere meanwhile.
async fn commit(
    ctx: &Context<'_>,
    request: Request,
    counterpart: Participant,
    common: CategorySet,
    source: Source,
    taken: Option<QueueEntry>,
) -> HandlerResult {
    let hub = ctx.hub;
    let directory = hub.directory();

    match claim(directory, request.name.as_deref(), counterpart.name.as_deref()).await {
        Claim::Claimed => {}
        Claim::RequesterTaken => {
            // Someone else matched the requester; they have been told.
            info!(conn = %request.conn, "requester matched concurrently, abandoning");
            crate::metrics::record_match_conflict();
            if let Some(entry) = taken {
                hub.restore_queued(entry);
            }
            return Ok(());
        }
        Claim::CounterpartTaken => {
            info!(counterpart = ?counterpart.name, "counterpart matched concurrently, re-queuing");
            crate::metrics::record_match_conflict();
            enqueue(ctx, request);
            return Ok(());
        }
    }

    // The counterpart may have gone away while we awaited the claim.
    if !hub.connections.contains(&counterpart.conn) {
        info!(counterpart = ?counterpart.name, "counterpart disconnected during match, re-queuing");
        let names: Vec<&str> = [request.name.as_deref(), counterpart.name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if let Err(e) = directory.set_available(&names, true).await {
            warn!(error = %e, "failed to release abandoned claim");
        }
        enqueue(ctx, request);
        return Ok(());
    }

    let room_id = hub.open_room(request.participant(), counterpart, common);
    crate::metrics::record_match(source.as_str());
    info!(room = %room_id, source = source.as_str(), "match found");
    Ok(())
}

/// Claim both participants; directory failures are logged and the match
/// proceeds.
async fn claim(
    directory: &dyn Directory,
    requester: Option<&str>,
    counterpart: Option<&str>,
) -> Claim {
    if requester.is_none() && counterpart.is_none() {
        return Claim::Claimed;
    }
    match directory.claim_pair(requester, counterpart).await {
        Ok(claim) => claim,
        Err(e) => {
            warn!(error = %e, "availability claim failed, continuing with match");
            Claim::Claimed
        }
    }
}

/// Handler for `cancelMatch`.
pub struct CancelMatchHandler;

#[async_trait]
impl Handler for CancelMatchHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::CancelMatch = event else {
            return Ok(());
        };

        let name = ctx.name();
        if ctx.hub.dequeue(ctx.conn, name.as_deref()) {
            info!(conn = %ctx.conn, "match request cancelled");
        }
        // A cancelled request must not be handed out by the directory path.
        if let Some(name) = &name
            && ctx.hub.room_of(ctx.conn).is_none()
            && let Err(e) = ctx.hub.directory().set_available(&[name.as_str()], false).await
        {
            warn!(%name, error = %e, "failed to mark user unavailable");
        }
        ctx.reply(ServerEvent::MatchCancelled);
        Ok(())
    }
}

/// Handler for `declineMatch`.
pub struct DeclineMatchHandler;

#[async_trait]
impl Handler for DeclineMatchHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::DeclineMatch { room_id } = event else {
            return Ok(());
        };

        let name = ctx.name();
        let Some(room) = ctx.hub.decline_room(&room_id, ctx.conn, name.as_deref())? else {
            return Ok(());
        };

        let names: Vec<&str> = room
            .participants
            .iter()
            .filter_map(|p| p.name.as_deref())
            .collect();
        if !names.is_empty()
            && let Err(e) = ctx.hub.directory().set_available(&names, true).await
        {
            warn!(room = %room_id, error = %e, "failed to reset availability after decline");
        }
        Ok(())
    }
}
