//! Chat relay handler.

use super::{Context, Handler};
use crate::error::HandlerResult;
use async_trait::async_trait;
use supportline_proto::ClientEvent;
use tracing::trace;

/// Handler for `sendMessage`.
///
/// The payload goes out verbatim to the other members; the sender gets no
/// echo.
pub struct SendMessageHandler;

#[async_trait]
impl Handler for SendMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let ClientEvent::SendMessage { room_id, payload } = event else {
            return Ok(());
        };

        let delivered = ctx.hub.relay(&room_id, ctx.conn, payload)?;
        trace!(room = %room_id, delivered, "message relayed");
        Ok(())
    }
}
