//! State management module.
//!
//! Contains the Hub (shared matchmaker state) and the structures it owns:
//! the connection registry, the match queue and the room manager.

mod conn_id;
mod hub;
mod queue;
mod registry;
mod rooms;

pub use conn_id::{ConnId, ConnIdGenerator};
pub use hub::{Hub, HubCounts, LeaveCause};
pub use queue::{QueueEntry, QueueKey};
pub use registry::{Bind, Outbound, OutboundReceivers};
pub use rooms::Participant;

#[cfg(test)]
pub(crate) use hub::tests as testing;
