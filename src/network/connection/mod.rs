//! Connection - Handles an individual client connection.
//!
//! Each Connection runs in its own Tokio task:
//!
//! ```text
//!    ┌──────────────────────────────────────────────────────┐
//!    │                Unified Connection Task               │
//!    │                                                      │
//!    │   shutdown ──┐                                       │
//!    │   control  ──┤                      ┌────────────┐   │
//!    │   relay    ──┼──▶ select! (biased) ─▶│ WebSocket  │   │
//!    │   ws read  ──┤        │              │   sink     │   │
//!    │   keepalive ─┘        ▼              └────────────┘   │
//!    │                  [Handlers] ──▶ control / relay queues│
//!    └──────────────────────────────────────────────────────┘
//! ```
//!
//! Notifications produced by any handler, for any connection, travel
//! through the target's outbound queues; only this task writes to the
//! socket. The control queue is always drained before the relay queue.

mod error_handling;

use error_handling::{ReadAction, classify_frame, handler_error_to_reply, protocol_error_to_reply};

use crate::error::HandlerError;
use crate::handlers::{Context, Registry, cleanup_connection};
use crate::state::{ConnId, Hub, Outbound};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use supportline_proto::{DisconnectReason, ServerEvent};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, instrument, warn};

/// Upper bound on how often idle time is checked.
const MAX_KEEPALIVE_CHECK: Duration = Duration::from_secs(5);

/// Keepalive policy for one connection.
#[derive(Debug, Clone, Copy)]
pub struct Keepalive {
    /// Inbound silence before the server pings.
    pub ping: Duration,
    /// Further silence, after `ping`, before the connection is dropped.
    pub timeout: Duration,
}

impl Keepalive {
    fn check_interval(&self) -> Duration {
        (self.ping / 2).clamp(Duration::from_millis(100), MAX_KEEPALIVE_CHECK)
    }
}

/// A client connection handler.
pub struct Connection<S> {
    conn: ConnId,
    addr: SocketAddr,
    tls: bool,
    hub: Arc<Hub>,
    registry: Arc<Registry>,
    ws: WebSocketStream<S>,
    keepalive: Keepalive,
    shutdown: broadcast::Receiver<()>,
}

type Sink<S> = SplitSink<WebSocketStream<S>, Message>;

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: ConnId,
        addr: SocketAddr,
        tls: bool,
        hub: Arc<Hub>,
        registry: Arc<Registry>,
        ws: WebSocketStream<S>,
        keepalive: Keepalive,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            conn,
            addr,
            tls,
            hub,
            registry,
            ws,
            keepalive,
            shutdown,
        }
    }

    /// Run the connection until it closes, then clean up after it.
    #[instrument(
        skip(self),
        fields(conn = %self.conn, addr = %self.addr, tls = self.tls),
        name = "connection"
    )]
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            conn,
            hub,
            registry,
            ws,
            keepalive,
            mut shutdown,
            ..
        } = self;

        let (outbound, mut rx) = Outbound::channel(hub.settings.outbound_queue);
        hub.connections.register(conn.clone(), outbound);
        info!(server = %hub.server_info.name, "Client connected");

        let (mut sink, mut stream) = ws.split();

        let hello = ServerEvent::ConnectionEstablished {
            connection_id: conn.to_string(),
            server: hub.server_info.name.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let reason = if let Err(e) = write_event(&mut sink, &hello).await {
            debug!(error = %e, "failed to greet client");
            DisconnectReason::TransportError
        } else {
            let ctx = Context { conn: &conn, hub: &hub };
            let mut last_activity = Instant::now();
            let mut ping_pending = false;
            let mut keepalive_tick = tokio::time::interval(keepalive.check_interval());
            keepalive_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.recv() => {
                        break DisconnectReason::ServerDisconnect;
                    }

                    Some(event) = rx.control.recv() => {
                        if let Err(e) = write_event(&mut sink, &event).await {
                            debug!(error = %e, "write failed");
                            break DisconnectReason::TransportError;
                        }
                    }

                    Some(event) = rx.relay.recv() => {
                        if let Err(e) = write_event(&mut sink, &event).await {
                            debug!(error = %e, "write failed");
                            break DisconnectReason::TransportError;
                        }
                    }

                    frame = stream.next() => {
                        last_activity = Instant::now();
                        ping_pending = false;

                        match classify_frame(frame) {
                            ReadAction::Event(event) => {
                                let name = event.name();
                                match registry.dispatch(&ctx, event).await {
                                    Ok(()) => {}
                                    Err(HandlerError::Quit(reason)) => break reason,
                                    Err(e) => {
                                        debug!(event = name, error = %e, "event failed");
                                        if let Some(reply) = handler_error_to_reply(&e, name) {
                                            ctx.reply(reply);
                                        }
                                    }
                                }
                            }
                            ReadAction::Reject(e) => {
                                debug!(error = %e, "rejected frame");
                                crate::metrics::record_event_error("invalid", e.code());
                                ctx.reply(protocol_error_to_reply(&e));
                            }
                            ReadAction::Ignore => {}
                            ReadAction::Close(reason) => break reason,
                        }
                    }

                    _ = keepalive_tick.tick() => {
                        let idle = last_activity.elapsed();
                        if idle >= keepalive.ping + keepalive.timeout {
                            info!(idle_secs = idle.as_secs(), "Ping timeout");
                            break DisconnectReason::PingTimeout;
                        }
                        if idle >= keepalive.ping && !ping_pending {
                            if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                                debug!(error = %e, "ping failed");
                                break DisconnectReason::TransportError;
                            }
                            ping_pending = true;
                        }
                    }
                }
            }
        };

        cleanup_connection(&hub, &conn, &reason).await;

        if let Some(code) = close_code(&reason) {
            let frame = CloseFrame {
                code,
                reason: Cow::Owned(reason.as_raw().to_string()),
            };
            if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                debug!(error = %e, "failed to send close frame");
            }
        }
        let _ = sink.close().await;

        info!(reason = %reason, "Client disconnected");
        Ok(())
    }
}

/// Close code for connections the server ends; `None` when the peer already
/// closed or the transport is gone.
fn close_code(reason: &DisconnectReason) -> Option<CloseCode> {
    match reason {
        DisconnectReason::ServerDisconnect => Some(CloseCode::Away),
        DisconnectReason::PingTimeout => Some(CloseCode::Policy),
        DisconnectReason::TransportClose | DisconnectReason::TransportError => None,
        DisconnectReason::ClientDisconnect | DisconnectReason::Other(_) => Some(CloseCode::Normal),
    }
}

async fn write_event<S>(sink: &mut Sink<S>, event: &ServerEvent) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let text = match event.encode() {
        Ok(text) => text,
        Err(e) => {
            warn!(event = event.name(), error = %e, "failed to encode notification");
            return Ok(());
        }
    };
    sink.send(Message::Text(text)).await?;
    Ok(())
}
