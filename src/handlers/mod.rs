//! Event handlers.
//!
//! This module contains the Handler trait and the registry that dispatches
//! decoded [`ClientEvent`]s to the appropriate handler.

mod connection;
mod matching;
mod relay;
mod room;

pub use connection::cleanup_connection;

use crate::error::{HandlerError, HandlerResult};
use crate::state::{ConnId, Hub};
use crate::telemetry::EventTimer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use supportline_proto::{ClientEvent, ServerEvent};
use tracing::{Instrument, debug, info_span};

/// Handler context passed to each event handler.
pub struct Context<'a> {
    /// The connection the event arrived on.
    pub conn: &'a ConnId,
    /// Shared matchmaker state.
    pub hub: &'a Arc<Hub>,
}

impl Context<'_> {
    /// Name bound to this connection, if authenticated.
    pub fn name(&self) -> Option<String> {
        self.hub.connections.name_of(self.conn)
    }

    /// Queue a notification for this connection.
    pub fn reply(&self, event: ServerEvent) {
        self.hub.connections.send_control(self.conn, event);
    }
}

/// Trait implemented by all event handlers.
///
/// Handlers receive the owned event; each one only acts on the variant it
/// is registered for.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle an incoming event.
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult;
}

/// Registry of event handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Connection lifecycle
        handlers.insert("authenticate", Box::new(connection::AuthenticateHandler));
        handlers.insert("clientConnect", Box::new(connection::ClientConnectHandler));
        handlers.insert("ping", Box::new(connection::PingHandler));
        handlers.insert("disconnect", Box::new(connection::DisconnectHandler));

        // Matchmaking
        handlers.insert("findMatch", Box::new(matching::FindMatchHandler));
        handlers.insert("cancelMatch", Box::new(matching::CancelMatchHandler));
        handlers.insert("declineMatch", Box::new(matching::DeclineMatchHandler));

        // Rooms
        handlers.insert("joinRoom", Box::new(room::JoinRoomHandler));
        handlers.insert("acceptMatch", Box::new(room::AcceptMatchHandler));
        handlers.insert("leaveRoom", Box::new(room::LeaveRoomHandler));

        // Relay
        handlers.insert("sendMessage", Box::new(relay::SendMessageHandler));

        Self { handlers }
    }

    /// Dispatch an event to its handler.
    pub async fn dispatch(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult {
        let name = event.name();
        let Some(handler) = self.handlers.get(name) else {
            // Every ClientEvent variant is registered above.
            debug!(event = name, "no handler registered");
            return Ok(());
        };

        let _timer = EventTimer::new(name);
        let span = info_span!("event", event = name, conn = %ctx.conn);
        let result = handler.handle(ctx, event).instrument(span).await;

        if let Err(ref e) = result
            && !matches!(e, HandlerError::Quit(_))
        {
            crate::metrics::record_event_error(name, e.error_code());
        }
        result
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
