//! Disconnect reason classification.
//!
//! Transport-level reasons are mapped to a small human-readable taxonomy
//! purely for display to the partner left behind in a room. Raw reasons use
//! the spellings long-standing clients already send in `disconnect` events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse category of a disconnect, shown alongside `userLeftRoom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectKind {
    /// Keepalive expired; usually a poor network.
    Timeout,
    /// The underlying socket failed or vanished.
    TransportFailure,
    /// The user chose to leave.
    Voluntary,
    /// The server closed the connection.
    Server,
    /// A reason this server does not recognize.
    Unknown,
}

impl DisconnectKind {
    /// Wire spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::TransportFailure => "transport_failure",
            Self::Voluntary => "voluntary",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// `io server disconnect`
    ServerDisconnect,
    /// `io client disconnect`
    ClientDisconnect,
    /// `ping timeout`
    PingTimeout,
    /// `transport close`
    TransportClose,
    /// `transport error`
    TransportError,
    /// Anything else, passed through verbatim.
    Other(String),
}

impl DisconnectReason {
    /// Classify a raw reason string.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim() {
            "io server disconnect" => Self::ServerDisconnect,
            "io client disconnect" | "" => Self::ClientDisconnect,
            "ping timeout" => Self::PingTimeout,
            "transport close" => Self::TransportClose,
            "transport error" => Self::TransportError,
            other => Self::Other(other.to_string()),
        }
    }

    /// Raw spelling, suitable for logs.
    pub fn as_raw(&self) -> &str {
        match self {
            Self::ServerDisconnect => "io server disconnect",
            Self::ClientDisconnect => "io client disconnect",
            Self::PingTimeout => "ping timeout",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::Other(raw) => raw,
        }
    }

    /// Coarse classification.
    pub fn kind(&self) -> DisconnectKind {
        match self {
            Self::ServerDisconnect => DisconnectKind::Server,
            Self::ClientDisconnect => DisconnectKind::Voluntary,
            Self::PingTimeout => DisconnectKind::Timeout,
            Self::TransportClose | Self::TransportError => DisconnectKind::TransportFailure,
            Self::Other(_) => DisconnectKind::Unknown,
        }
    }

    /// Human-readable description. Unrecognized reasons pass through as-is.
    pub fn describe(&self) -> &str {
        match self {
            Self::ServerDisconnect => "Server forced disconnect",
            Self::ClientDisconnect => "Client initiated disconnect",
            Self::PingTimeout => "Connection timeout due to poor network",
            Self::TransportClose => "Transport connection lost",
            Self::TransportError => "Transport error occurred",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_raw())
    }
}
