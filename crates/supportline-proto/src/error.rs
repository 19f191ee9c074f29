//! Error types for decoding and validating wire events.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Protocol-level failures detected at the connection boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match any known event shape.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A role string other than `listener` or `support-seeker`.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// A name that is empty, too long, or contains control characters.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Binary frames carry no events in this protocol.
    #[error("binary frames are not supported")]
    BinaryFrame,
}

impl ProtocolError {
    /// Static error code used in `error` notifications and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_event",
            Self::UnknownRole(_) => "malformed_event",
            Self::InvalidName(_) => "invalid_name",
            Self::BinaryFrame => "binary_frame",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ProtocolError::BinaryFrame.code(), "binary_frame");
        assert_eq!(ProtocolError::InvalidName(String::new()).code(), "invalid_name");
        assert_eq!(ProtocolError::UnknownRole("x".into()).code(), "malformed_event");
    }
}
