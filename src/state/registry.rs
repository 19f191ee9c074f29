//! Connection registry.
//!
//! One entry per live connection, holding its bound name and the two
//! outbound queues. A secondary index maps case-folded names to the
//! connection that owns them, so the matcher can reach a user who is not
//! in a room yet.

use super::ConnId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Instant;
use supportline_proto::{ServerEvent, name_key};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Which outbound queue an event travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Lifecycle and presence notifications.
    Control,
    /// Relayed chat payloads.
    Relay,
}

impl Lane {
    fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Relay => "relay",
        }
    }
}

/// Sending halves of a connection's outbound queues.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub control: mpsc::Sender<ServerEvent>,
    pub relay: mpsc::Sender<ServerEvent>,
}

/// Receiving halves, owned by the connection's write loop.
pub struct OutboundReceivers {
    pub control: mpsc::Receiver<ServerEvent>,
    pub relay: mpsc::Receiver<ServerEvent>,
}

impl Outbound {
    /// Create a pair of bounded queues.
    pub fn channel(capacity: usize) -> (Self, OutboundReceivers) {
        let (control, control_rx) = mpsc::channel(capacity);
        let (relay, relay_rx) = mpsc::channel(capacity);
        (
            Self { control, relay },
            OutboundReceivers {
                control: control_rx,
                relay: relay_rx,
            },
        )
    }
}

#[derive(Debug)]
struct Slot {
    name: Option<String>,
    outbound: Outbound,
    connected_at: Instant,
}

/// Result of binding a name to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    /// The name is now bound.
    Bound,
    /// The connection already had exactly this name.
    Unchanged,
    /// Another live connection owns the name.
    InUse,
    /// The connection is bound to a different name.
    AlreadyBound(String),
    /// The connection is gone.
    Gone,
}

/// Live connections, keyed by id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnId, Slot>,
    names: DashMap<String, ConnId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with no identity.
    pub fn register(&self, id: ConnId, outbound: Outbound) {
        self.connections.insert(
            id,
            Slot {
                name: None,
                outbound,
                connected_at: Instant::now(),
            },
        );
        crate::metrics::set_connections(self.connections.len());
    }

    /// Remove a connection and release its name.
    ///
    /// Returns `None` when the connection was already removed, so cleanup
    /// that depends on it runs at most once. Otherwise returns the name it
    /// was bound to, if any.
    pub fn unregister(&self, id: &ConnId) -> Option<Option<String>> {
        let (_, entry) = self.connections.remove(id)?;
        if let Some(name) = &entry.name {
            self.names.remove_if(&name_key(name), |_, owner| owner == id);
        }
        crate::metrics::set_connections(self.connections.len());
        debug!(
            conn = %id,
            lifetime_ms = entry.connected_at.elapsed().as_millis() as u64,
            "connection unregistered"
        );
        Some(entry.name)
    }

    /// Bind `name` to connection `id`.
    pub fn bind_name(&self, id: &ConnId, name: &str) -> Bind {
        match self.connections.get(id) {
            None => return Bind::Gone,
            Some(entry) => match &entry.name {
                Some(current) if name_key(current) == name_key(name) => return Bind::Unchanged,
                Some(current) => return Bind::AlreadyBound(current.clone()),
                None => {}
            },
        }

        match self.names.entry(name_key(name)) {
            Entry::Occupied(owner) if owner.get() != id => return Bind::InUse,
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        match self.connections.get_mut(id) {
            Some(mut entry) => {
                entry.name = Some(name.to_string());
                Bind::Bound
            }
            None => {
                // Unregistered between the two lookups; give the name back.
                self.names.remove_if(&name_key(name), |_, owner| owner == id);
                Bind::Gone
            }
        }
    }

    /// The name bound to a connection.
    pub fn name_of(&self, id: &ConnId) -> Option<String> {
        self.connections.get(id).and_then(|e| e.name.clone())
    }

    /// The live connection bound to `name`.
    pub fn lookup_name(&self, name: &str) -> Option<ConnId> {
        self.names.get(&name_key(name)).map(|id| id.value().clone())
    }

    pub fn contains(&self, id: &ConnId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Queue a lifecycle notification.
    pub fn send_control(&self, id: &ConnId, event: ServerEvent) -> bool {
        self.send(id, Lane::Control, event)
    }

    /// Queue a relayed chat payload.
    pub fn send_relay(&self, id: &ConnId, event: ServerEvent) -> bool {
        self.send(id, Lane::Relay, event)
    }

    /// Non-blocking enqueue. A full queue drops the event.
    fn send(&self, id: &ConnId, lane: Lane, event: ServerEvent) -> bool {
        let sender = match self.connections.get(id) {
            Some(entry) => match lane {
                Lane::Control => entry.outbound.control.clone(),
                Lane::Relay => entry.outbound.relay.clone(),
            },
            None => {
                debug!(conn = %id, event = event.name(), "dropping event for unknown connection");
                return false;
            }
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    conn = %id,
                    lane = lane.as_str(),
                    event = event.name(),
                    "outbound queue full, dropping event"
                );
                crate::metrics::record_outbound_dropped(lane.as_str());
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(ids: &[&str]) -> (ConnectionRegistry, Vec<OutboundReceivers>) {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for id in ids {
            let (outbound, rx) = Outbound::channel(2);
            registry.register(ConnId::from(*id), outbound);
            receivers.push(rx);
        }
        (registry, receivers)
    }

    #[test]
    fn bind_name_enforces_uniqueness_case_insensitively() {
        let (registry, _rx) = registry_with(&["a", "b"]);
        let a = ConnId::from("a");
        let b = ConnId::from("b");

        assert_eq!(registry.bind_name(&a, "Alice"), Bind::Bound);
        assert_eq!(registry.bind_name(&a, "alice"), Bind::Unchanged);
        assert_eq!(registry.bind_name(&b, "ALICE"), Bind::InUse);
        assert_eq!(
            registry.bind_name(&a, "Bob"),
            Bind::AlreadyBound("Alice".to_string())
        );
        assert_eq!(registry.lookup_name("aLiCe"), Some(a));
    }

    #[test]
    fn unregister_releases_name_once() {
        let (registry, _rx) = registry_with(&["a", "b"]);
        let a = ConnId::from("a");
        let b = ConnId::from("b");
        registry.bind_name(&a, "alice");

        assert_eq!(registry.unregister(&a), Some(Some("alice".to_string())));
        assert_eq!(registry.unregister(&a), None);
        assert_eq!(registry.lookup_name("alice"), None);
        assert_eq!(registry.bind_name(&b, "alice"), Bind::Bound);
    }

    #[test]
    fn bind_on_unknown_connection_is_gone() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.bind_name(&ConnId::from("x"), "x"), Bind::Gone);
    }

    #[test]
    fn lanes_are_independent_and_bounded() {
        let (registry, mut rx) = registry_with(&["a"]);
        let a = ConnId::from("a");
        let ping = || ServerEvent::MatchCancelled;

        assert!(registry.send_control(&a, ping()));
        assert!(registry.send_control(&a, ping()));
        assert!(!registry.send_control(&a, ping()), "third event overflows capacity 2");
        assert!(registry.send_relay(&a, ping()));

        let rx = &mut rx[0];
        assert_eq!(rx.control.try_recv().ok(), Some(ServerEvent::MatchCancelled));
        assert_eq!(rx.relay.try_recv().ok(), Some(ServerEvent::MatchCancelled));
    }

    #[test]
    fn send_to_unknown_connection_fails_quietly() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_control(&ConnId::from("nobody"), ServerEvent::MatchCancelled));
    }
}
