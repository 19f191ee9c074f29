//! Matchmaking configuration.

use serde::Deserialize;

use super::types::default_true;

/// Matchmaking configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// How many directory candidates to fetch per request, most recent first (default: 5).
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
        }
    }
}

fn default_candidate_limit() -> u32 {
    5
}

/// User directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Create a directory row on `authenticate` when the name is unknown (default: true).
    /// Disable when an external registration service owns the table.
    #[serde(default = "default_true")]
    pub auto_register: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
        }
    }
}
