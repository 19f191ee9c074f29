//! Connection lifecycle handlers.
//!
//! Handles authenticate, clientConnect, ping and disconnect, plus the
//! cleanup cascade that runs when a connection goes away.

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::{Bind, ConnId, Hub, LeaveCause};
use async_trait::async_trait;
use std::sync::Arc;
use supportline_proto::{ClientEvent, DisconnectReason, ServerEvent, normalize_name};
use tracing::{debug, info, warn};

/// Bind `name` to the connection, registering it with the directory the
/// first time. Returns the bound name.
pub(super) async fn bind_identity(ctx: &Context<'_>, name: &str) -> Result<String, HandlerError> {
    let name = normalize_name(name)?;

    match ctx.hub.connections.bind_name(ctx.conn, name) {
        Bind::Bound => {
            info!(conn = %ctx.conn, %name, "authenticated");
            if let Err(e) = ctx.hub.directory().ensure_user(name).await {
                warn!(%name, error = %e, "failed to register user in directory");
            }
            Ok(name.to_string())
        }
        Bind::Unchanged => Ok(ctx.name().unwrap_or_else(|| name.to_string())),
        Bind::InUse => Err(HandlerError::NameInUse(name.to_string())),
        Bind::AlreadyBound(current) => Err(HandlerError::AlreadyAuthenticated(current)),
        Bind::Gone => Err(HandlerError::Quit(DisconnectReason::TransportClose)),
    }
}

/// Handler for `authenticate`.
pub struct AuthenticateHandler;

#[async_trait]
impl Handler for AuthenticateHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::Authenticate { name } = event else {
            return Ok(());
        };

        let name = bind_identity(ctx, &name).await?;
        ctx.reply(ServerEvent::AuthenticationConfirmed { name });
        Ok(())
    }
}

/// Handler for `clientConnect`: authenticate and rejoin in one step.
pub struct ClientConnectHandler;

#[async_trait]
impl Handler for ClientConnectHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::ClientConnect {
            user_id,
            user_name,
            room_id,
        } = event
        else {
            return Ok(());
        };

        let name = user_name
            .or(user_id)
            .filter(|n| !n.trim().is_empty());
        if let Some(name) = name {
            bind_identity(ctx, &name).await?;
        }

        let joined = match room_id.as_deref().filter(|r| !r.is_empty()) {
            Some(room_id) => {
                let entered = ctx
                    .hub
                    .join_room(room_id, ctx.conn, ctx.name().as_deref())?;
                if let Some(entered) = &entered {
                    ctx.hub.release(&entered.released).await;
                    if let Some(name) = ctx.name()
                        && let Err(e) = ctx
                            .hub
                            .directory()
                            .set_available(&[name.as_str()], false)
                            .await
                    {
                        warn!(%name, error = %e, "failed to mark user unavailable");
                    }
                }
                entered.map(|entered| entered.occupancy)
            }
            None => None,
        };

        ctx.reply(ServerEvent::ConnectAck {
            room_joined: joined.is_some(),
            room_size: joined.unwrap_or(0),
        });
        Ok(())
    }
}

/// Handler for application-level `ping`.
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::Ping(echo) = event else {
            return Ok(());
        };

        ctx.reply(ServerEvent::Pong {
            timestamp: chrono::Utc::now().timestamp_millis(),
            echo,
        });
        Ok(())
    }
}

/// Handler for `disconnect`.
pub struct DisconnectHandler;

#[async_trait]
impl Handler for DisconnectHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::Disconnect { reason } = event else {
            return Ok(());
        };

        let reason = reason
            .as_deref()
            .map(DisconnectReason::from_raw)
            .unwrap_or(DisconnectReason::ClientDisconnect);
        debug!(conn = %ctx.conn, %reason, "client announced disconnect");

        // Signal quit by returning Quit error that connection loop will handle
        Err(HandlerError::Quit(reason))
    }
}

/// Tear down everything a connection owned.
///
/// Leaves its room (telling the other member why), closes rooms it was
/// matched into but never joined, drops its queue entry and marks its name
/// available again. Safe to call more than once: only the first call for a
/// connection does anything.
pub async fn cleanup_connection(hub: &Arc<Hub>, conn: &ConnId, reason: &DisconnectReason) {
    let Some(name) = hub.connections.unregister(conn) else {
        return;
    };

    let mut released = Vec::new();
    if let Some(room_id) = hub.room_of(conn)
        && let Some(left) = hub.leave_room(&room_id, conn, LeaveCause::Disconnected(reason.clone()))
    {
        released.extend(left.stranded);
    }
    released.extend(hub.abandon_matches(conn, reason));
    hub.release(&released).await;

    if hub.dequeue(conn, name.as_deref()) {
        debug!(%conn, "removed queued match request on disconnect");
    }

    info!(
        %conn,
        name = name.as_deref().unwrap_or("-"),
        reason = %reason,
        kind = reason.kind().as_str(),
        "connection cleaned up"
    );

    if let Some(name) = name
        && let Err(e) = hub.directory().mark_active(&name).await
    {
        warn!(%name, error = %e, "failed to reset availability on disconnect");
    }
}
