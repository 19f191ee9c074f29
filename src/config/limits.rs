//! Per-connection resource limits.

use serde::Deserialize;

/// Per-connection resource limits.
///
/// These keep a single slow or abusive client from exhausting server memory.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum chat text length in bytes (default: 4096).
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Maximum WebSocket frame size in bytes (default: 65536).
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Capacity of each outbound queue per connection (default: 64).
    /// Events beyond this are dropped with a warning.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

fn default_max_message_bytes() -> usize {
    4096
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

fn default_outbound_queue() -> usize {
    64
}
