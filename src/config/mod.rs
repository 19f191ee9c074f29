//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, TimeoutsConfig)
//! - [`listen`]: Network listener configuration (ListenConfig, TlsConfig)
//! - [`matching`]: Matchmaking and directory behaviour (MatchingConfig, DirectoryConfig)
//! - [`limits`]: Per-connection resource limits (LimitsConfig)
//! - [`validation`]: Startup validation collecting every problem at once

mod limits;
mod listen;
mod matching;
mod types;
pub mod validation;

pub use limits::LimitsConfig;
pub use listen::{ListenConfig, TlsConfig};
pub use matching::{DirectoryConfig, MatchingConfig};
pub use types::{Config, ConfigError, DatabaseConfig, ServerConfig, TimeoutsConfig};
