//! Room membership handlers: joinRoom, acceptMatch, leaveRoom.

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::LeaveCause;
use async_trait::async_trait;
use supportline_proto::{ClientEvent, ServerEvent};
use tracing::{debug, warn};

/// Join `room_id` and take the caller out of the candidate pool.
///
/// Returns the occupancy after joining, or `None` for an unknown room.
async fn enter(ctx: &Context<'_>, room_id: &str) -> Result<Option<usize>, HandlerError> {
    let name = ctx.name();
    let Some(entered) = ctx.hub.join_room(room_id, ctx.conn, name.as_deref())? else {
        return Ok(None);
    };
    ctx.hub.release(&entered.released).await;

    if let Some(name) = &name
        && let Err(e) = ctx.hub.directory().set_available(&[name.as_str()], false).await
    {
        warn!(%name, error = %e, "failed to mark user unavailable");
    }
    Ok(Some(entered.occupancy))
}

/// Handler for `joinRoom`.
pub struct JoinRoomHandler;

#[async_trait]
impl Handler for JoinRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::JoinRoom { room_id } = event else {
            return Ok(());
        };

        enter(ctx, &room_id).await?;
        Ok(())
    }
}

/// Handler for `acceptMatch`: join, then tell every member.
pub struct AcceptMatchHandler;

#[async_trait]
impl Handler for AcceptMatchHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::AcceptMatch { room_id } = event else {
            return Ok(());
        };

        if enter(ctx, &room_id).await?.is_none() {
            return Ok(());
        }
        debug!(room = %room_id, conn = %ctx.conn, "match accepted");
        for member in ctx.hub.room_members(&room_id) {
            ctx.hub.connections.send_control(
                &member,
                ServerEvent::MatchAccepted {
                    room_id: room_id.clone(),
                },
            );
        }
        Ok(())
    }
}

/// Handler for `leaveRoom`.
pub struct LeaveRoomHandler;

#[async_trait]
impl Handler for LeaveRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::LeaveRoom { room_id } = event else {
            return Ok(());
        };

        let Some(left) = ctx.hub.leave_room(&room_id, ctx.conn, LeaveCause::Voluntary) else {
            return Ok(());
        };
        ctx.hub.release(&left.stranded).await;

        // Back in the pool for the next match.
        if let Some(name) = ctx.name()
            && let Err(e) = ctx.hub.directory().set_available(&[name.as_str()], true).await
        {
            warn!(%name, error = %e, "failed to mark user available");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Registry;
    use super::*;
    use crate::state::testing::{connect, drain, test_hub};
    use crate::state::{ConnId, Hub, Participant};
    use std::sync::Arc;
    use supportline_proto::{CategorySet, Role};

    async fn send(hub: &Arc<Hub>, conn: &ConnId, event: ClientEvent) -> HandlerResult {
        Registry::new()
            .dispatch(&Context { conn, hub }, event)
            .await
    }

    fn matched(hub: &Hub, a: &ConnId, b: &ConnId) -> String {
        hub.open_room(
            Participant {
                conn: a.clone(),
                name: Some("a".into()),
                role: Role::SupportSeeker,
            },
            Participant {
                conn: b.clone(),
                name: Some("b".into()),
                role: Role::Listener,
            },
            CategorySet::from([1]),
        )
    }

    #[tokio::test]
    async fn join_then_leave_reports_occupancy() {
        let (hub, _db) = test_hub().await;
        let (a, mut a_rx) = connect(&hub, Some("a"));
        let (b, mut b_rx) = connect(&hub, Some("b"));
        let room = matched(&hub, &a, &b);
        drain(&mut a_rx);
        drain(&mut b_rx);

        send(&hub, &b, ClientEvent::JoinRoom { room_id: room.clone() }).await.unwrap();
        assert!(drain(&mut a_rx).contains(&ServerEvent::RoomReady {
            room_id: room.clone(),
            users_in_room: 2
        }));
        drain(&mut b_rx);

        send(&hub, &b, ClientEvent::LeaveRoom { room_id: room.clone() }).await.unwrap();
        assert_eq!(
            drain(&mut a_rx),
            vec![ServerEvent::UserLeftRoom {
                room_id: room.clone(),
                users_in_room: 1,
                disconnected: false,
                reason: None,
                reason_code: None,
            }]
        );

        // A late second leave is ignored.
        send(&hub, &b, ClientEvent::LeaveRoom { room_id: room }).await.unwrap();
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn accept_match_announces_to_members() {
        let (hub, _db) = test_hub().await;
        let (a, mut a_rx) = connect(&hub, Some("a"));
        let (b, mut b_rx) = connect(&hub, Some("b"));
        let room = matched(&hub, &a, &b);
        drain(&mut a_rx);
        drain(&mut b_rx);

        send(&hub, &b, ClientEvent::AcceptMatch { room_id: room.clone() }).await.unwrap();

        let accepted = ServerEvent::MatchAccepted { room_id: room };
        assert!(drain(&mut a_rx).contains(&accepted));
        assert!(drain(&mut b_rx).contains(&accepted));
    }

    #[tokio::test]
    async fn strangers_cannot_join() {
        let (hub, _db) = test_hub().await;
        let (a, _a_rx) = connect(&hub, Some("a"));
        let (b, _b_rx) = connect(&hub, Some("b"));
        let (c, mut c_rx) = connect(&hub, Some("c"));
        let room = matched(&hub, &a, &b);

        let err = send(&hub, &c, ClientEvent::JoinRoom { room_id: room })
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotParticipant(_)));

        send(&hub, &c, ClientEvent::JoinRoom { room_id: "unknown".into() })
            .await
            .unwrap();
        assert!(drain(&mut c_rx).is_empty());
    }

    #[tokio::test]
    async fn leaving_makes_user_available_again() {
        let (hub, db) = test_hub().await;
        let (a, _a_rx) = connect(&hub, Some("a"));
        let (b, _b_rx) = connect(&hub, Some("b"));
        hub.directory().ensure_user("a").await.unwrap();
        let room = matched(&hub, &a, &b);

        send(&hub, &a, ClientEvent::LeaveRoom { room_id: room }).await.unwrap();
        let available: bool = sqlx::query_scalar("SELECT is_available FROM users WHERE name = 'a'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(available);
    }
}
