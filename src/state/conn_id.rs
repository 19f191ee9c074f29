//! Connection identifiers.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle for one live network connection.
///
/// Never reused within a process, so a stale id held by a late event can
/// never address a newer connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnId(String);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Generates connection ids.
///
/// Format: a short per-process prefix plus an 8-character base36 counter,
/// e.g. `c7AAAAAAAB`.
pub struct ConnIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl ConnIdGenerator {
    /// Create a generator whose ids start with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(1),
        }
    }

    /// Generate the next unique id.
    pub fn next(&self) -> ConnId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        ConnId(format!("{}{}", self.prefix, base36_encode_8(n)))
    }
}

impl Default for ConnIdGenerator {
    fn default() -> Self {
        // Distinguishes ids across restarts in logs.
        let boot = chrono::Utc::now().timestamp() as u64 % 36;
        Self::new(format!("c{}", base36_encode_8(boot).chars().last().unwrap_or('A')))
    }
}

/// Encode a number as an 8-character base36 string.
fn base36_encode_8(mut n: u64) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut result = [b'A'; 8];

    for slot in result.iter_mut().rev() {
        *slot = CHARS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&result).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let generator = ConnIdGenerator::new("t");
        assert_eq!(generator.next().to_string(), "tAAAAAAAB");
        assert_eq!(generator.next().to_string(), "tAAAAAAAC");
    }

    #[test]
    fn test_base36_encode() {
        assert_eq!(base36_encode_8(0), "AAAAAAAA");
        assert_eq!(base36_encode_8(35), "AAAAAAA9");
        assert_eq!(base36_encode_8(36), "AAAAAABA");
    }

    #[test]
    fn default_prefix_is_two_chars() {
        let id = ConnIdGenerator::default().next().to_string();
        assert_eq!(id.len(), 10);
        assert!(id.starts_with('c'));
    }
}
