//! Identity case-folding.
//!
//! Names are unique case-insensitively. Folding is ASCII-only so that it
//! agrees with SQLite's `COLLATE NOCASE`, which the directory relies on.

use crate::error::ProtocolError;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 64;

/// Fold a name into its lookup key.
pub fn name_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Compare two names case-insensitively.
pub fn names_eq(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Validate a display name, returning it trimmed.
pub fn normalize_name(name: &str) -> Result<&str, ProtocolError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.chars().count() > MAX_NAME_LEN
        || trimmed.chars().any(char::is_control)
    {
        return Err(ProtocolError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}
