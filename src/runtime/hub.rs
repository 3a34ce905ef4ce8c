//! Live client connections.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broadcast::{Broadcast, Envelope};
use crate::registry::ConnectionId;

use super::LOG_TARGET;

struct Connection {
    id: ConnectionId,
    outgoing: mpsc::UnboundedSender<String>,
}

/// Maps each identity to the one connection it is reachable on.
///
/// Registering an identity again replaces its previous connection; the old
/// sender is dropped, which ends that socket's writer task.
#[derive(Default)]
pub struct ConnectionHub {
    next_id: AtomicU64,
    connections: DashMap<String, Connection>,
}

impl ConnectionHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for `identity` and returns its id.
    pub fn register(&self, identity: &str, outgoing: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let replaced = self
            .connections
            .insert(identity.to_owned(), Connection { id, outgoing })
            .is_some();
        debug!(target: LOG_TARGET, identity, connection = id.0, replaced, "connection registered");
        id
    }

    /// Removes `identity` if `connection` is still its current connection.
    /// Returns whether anything was removed.
    pub fn unregister(&self, identity: &str, connection: ConnectionId) -> bool {
        self.connections
            .remove_if(identity, |_, current| current.id == connection)
            .is_some()
    }

    /// Current connection of `identity`.
    #[must_use]
    pub fn connection_of(&self, identity: &str) -> Option<ConnectionId> {
        self.connections.get(identity).map(|current| current.id)
    }

    /// Number of connected identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns whether nobody is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn encode(envelope: &Envelope) -> Option<String> {
        match serde_json::to_string(envelope) {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(target: LOG_TARGET, %err, "failed to encode outbound event");
                None
            }
        }
    }
}

impl Broadcast for ConnectionHub {
    fn to_viewer(&self, identity: &str, envelope: &Envelope) {
        let Some(current) = self.connections.get(identity) else {
            return;
        };
        if let Some(text) = Self::encode(envelope) {
            if current.outgoing.send(text).is_err() {
                debug!(target: LOG_TARGET, identity, "writer gone; event dropped");
            }
        }
    }

    fn to_all(&self, envelope: &Envelope) {
        let Some(text) = Self::encode(envelope) else {
            return;
        };
        for current in &self.connections {
            let _ = current.outgoing.send(text.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Outbound;

    #[test]
    fn reconnect_replaces_and_stale_unregister_is_ignored() {
        let hub = ConnectionHub::new();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();

        let first = hub.register("ann", first_tx);
        let second = hub.register("ann", second_tx);
        assert_ne!(first, second);

        assert!(!hub.unregister("ann", first));
        assert_eq!(hub.connection_of("ann"), Some(second));

        hub.to_viewer("ann", &Envelope::server(Outbound::FlushProgress));
        assert!(first_rx.try_recv().is_err());
        let text = second_rx.try_recv().unwrap();
        let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame["event"], "flush_progress");
        assert!(frame["game"].is_null());

        assert!(hub.unregister("ann", second));
        assert!(hub.is_empty());
    }
}
