//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::limits::LimitsConfig;
use super::listen::{ListenConfig, TlsConfig};
use super::matching::{DirectoryConfig, MatchingConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// WebSocket listen configuration.
    pub listen: ListenConfig,
    /// Optional TLS (wss) listen configuration.
    pub tls: Option<TlsConfig>,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// Matchmaking configuration.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// User directory behaviour.
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Per-connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Keepalive configuration.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// SQLite path, falling back to `supportline.db` in the working directory.
    pub fn database_path(&self) -> &str {
        self.database
            .as_ref()
            .map(|d| d.path.as_str())
            .unwrap_or("supportline.db")
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, reported in `connectionEstablished`.
    pub name: String,
    /// HTTP side-port for `/metrics`, `/stats` and `/health` (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
}

/// Keepalive configuration for client connections.
///
/// The server pings a client after `ping` seconds without inbound traffic.
/// If nothing at all arrives for `ping + timeout` seconds the connection is
/// closed with reason "ping timeout".
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Seconds of inbound silence before sending a WebSocket ping (default: 25).
    #[serde(default = "default_ping_interval")]
    pub ping: u64,

    /// Additional seconds to wait for any frame after the ping (default: 20).
    #[serde(default = "default_ping_timeout")]
    pub timeout: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            ping: default_ping_interval(),
            timeout: default_ping_timeout(),
        }
    }
}

fn default_ping_interval() -> u64 {
    25
}

fn default_ping_timeout() -> u64 {
    20
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file (`:memory:` for an ephemeral store).
    pub path: String,
}

pub(super) fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_default_when_absent() {
        let config: Config = toml::from_str(
            r#"
[server]
name = "support.local"

[listen]
address = "127.0.0.1:8080"
"#,
        )
        .unwrap();

        assert_eq!(config.database_path(), "supportline.db");
        assert_eq!(config.matching.candidate_limit, 5);
        assert!(config.directory.auto_register);
        assert_eq!(config.timeouts.ping, 25);
        assert_eq!(config.timeouts.timeout, 20);
        assert!(config.tls.is_none());
        assert!(config.server.metrics_port.is_none());
    }

    #[test]
    fn missing_listen_is_a_parse_error() {
        let result: Result<Config, _> = toml::from_str("[server]\nname = \"x\"\n");
        assert!(result.is_err());
    }
}
