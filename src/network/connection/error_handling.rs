//! Classification of inbound frames, transport errors and handler errors.

use crate::error::HandlerError;
use supportline_proto::{ClientEvent, DisconnectReason, ProtocolError, ServerEvent};
use tokio_tungstenite::tungstenite::{self, Message};

/// What the read side of the loop should do with one frame.
#[derive(Debug)]
pub(super) enum ReadAction {
    /// A decoded event to dispatch.
    Event(ClientEvent),
    /// Not an event; tell the client and keep going.
    Reject(ProtocolError),
    /// Transport-level frame handled by tungstenite.
    Ignore,
    /// The connection is over.
    Close(DisconnectReason),
}

/// Classify the result of one `stream.next()`.
pub(super) fn classify_frame(frame: Option<Result<Message, tungstenite::Error>>) -> ReadAction {
    match frame {
        None => ReadAction::Close(DisconnectReason::TransportClose),
        Some(Err(e)) => ReadAction::Close(classify_read_error(&e)),
        Some(Ok(Message::Text(text))) => match ClientEvent::decode(&text) {
            Ok(event) => ReadAction::Event(event),
            Err(e) => ReadAction::Reject(e),
        },
        Some(Ok(Message::Binary(_))) => ReadAction::Reject(ProtocolError::BinaryFrame),
        Some(Ok(Message::Close(_))) => ReadAction::Close(DisconnectReason::ClientDisconnect),
        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => ReadAction::Ignore,
    }
}

/// Map a transport read error to a disconnect reason.
pub(super) fn classify_read_error(e: &tungstenite::Error) -> DisconnectReason {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            DisconnectReason::TransportClose
        }
        tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => DisconnectReason::TransportClose,
        _ => DisconnectReason::TransportError,
    }
}

/// Convert a handler error to the notification for the triggering client.
///
/// Returns `None` for errors that end the connection instead.
pub(super) fn handler_error_to_reply(error: &HandlerError, event: &str) -> Option<ServerEvent> {
    error.to_notification(event)
}

/// Notification for a frame that carried no valid event.
pub(super) fn protocol_error_to_reply(error: &ProtocolError) -> ServerEvent {
    ServerEvent::error(error.code(), error.to_string())
}
