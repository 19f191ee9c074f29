//! Conversation roles.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A user's declared posture. Matching always pairs opposite roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Offers support.
    #[serde(rename = "listener")]
    Listener,
    /// Seeks support.
    #[serde(rename = "support-seeker")]
    SupportSeeker,
}

impl Role {
    /// The role a counterpart must hold.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Listener => Self::SupportSeeker,
            Self::SupportSeeker => Self::Listener,
        }
    }

    /// Canonical wire and storage spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listener => "listener",
            Self::SupportSeeker => "support-seeker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listener" => Ok(Self::Listener),
            "support-seeker" => Ok(Self::SupportSeeker),
            other => Err(ProtocolError::UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for role in [Role::Listener, Role::SupportSeeker] {
            assert_ne!(role.opposite(), role);
            assert_eq!(role.opposite().opposite(), role);
        }
    }

    #[test]
    fn parse_matches_display() {
        assert_eq!("listener".parse::<Role>().unwrap(), Role::Listener);
        assert_eq!(
            Role::SupportSeeker.to_string().parse::<Role>().unwrap(),
            Role::SupportSeeker
        );
        assert!("Listener".parse::<Role>().is_err());
        assert!("helper".parse::<Role>().is_err());
    }
}
