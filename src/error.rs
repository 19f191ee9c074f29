//! Unified error handling for supportlined.
//!
//! Handler failures are converted into an outbound notification for the
//! triggering connection and labeled for metrics. None of them end the
//! accept loop or touch unrelated rooms.

use crate::db::DbError;
use supportline_proto::{DisconnectReason, ProtocolError, ServerEvent};
use thiserror::Error;

/// Errors that can occur while handling one inbound event.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed event: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("role is required")]
    RoleRequired,

    #[error("name already in use: {0}")]
    NameInUse(String),

    #[error("connection already authenticated as {0}")]
    AlreadyAuthenticated(String),

    #[error("already in room {0}")]
    AlreadyInRoom(String),

    #[error("not a participant of room {0}")]
    NotParticipant(String),

    #[error("room {0} is full")]
    RoomFull(String),

    #[error("not in room {0}")]
    NotInRoom(String),

    #[error("message of {0} bytes exceeds the limit of {1}")]
    MessageTooLarge(usize, usize),

    #[error("directory unavailable: {0}")]
    Directory(#[from] DbError),

    #[error("client quit: {0}")]
    Quit(DisconnectReason),
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Protocol(e) => e.code(),
            Self::RoleRequired => "role_required",
            Self::NameInUse(_) => "name_in_use",
            Self::AlreadyAuthenticated(_) => "already_authenticated",
            Self::AlreadyInRoom(_) => "already_in_room",
            Self::NotParticipant(_) => "not_participant",
            Self::RoomFull(_) => "room_full",
            Self::NotInRoom(_) => "not_in_room",
            Self::MessageTooLarge(..) => "message_too_large",
            Self::Directory(_) => "directory_error",
            Self::Quit(_) => "quit",
        }
    }

    /// Convert to the notification sent back to the triggering connection.
    ///
    /// Failures of a match request surface as `matchError`; everything else
    /// becomes a generic `error`. Returns `None` for `Quit`.
    pub fn to_notification(&self, event: &str) -> Option<ServerEvent> {
        match self {
            Self::Quit(_) => None,
            Self::RoleRequired => Some(ServerEvent::MatchError {
                reason: self.to_string(),
            }),
            Self::AlreadyInRoom(_) | Self::Directory(_) if event == "findMatch" => {
                Some(ServerEvent::MatchError {
                    reason: self.to_string(),
                })
            }
            Self::Directory(_) => Some(ServerEvent::error(
                self.error_code(),
                "directory unavailable, try again later",
            )),
            _ => Some(ServerEvent::error(self.error_code(), self.to_string())),
        }
    }
}

/// Result type for event handlers.
pub type HandlerResult = Result<(), HandlerError>;
