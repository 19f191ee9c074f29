//! Network module.
//!
//! Contains the Gateway (WebSocket listeners) and the per-socket Connection
//! task.

mod connection;
mod gateway;

pub use connection::{Connection, Keepalive};
pub use gateway::Gateway;
