//! Identity <-> connection registry and global presence

use std::collections::BTreeSet;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::GameError;
use crate::ws::protocol::ServerMsg;

use super::{Connection, Identity};

/// Tracks which identities currently hold a live connection.
///
/// Register and unregister are serialized so presence notifications go out
/// in the same order the registry changed.
pub struct ConnectionRegistry {
    connections: DashMap<Identity, Connection>,
    presence: Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            presence: Mutex::new(()),
        }
    }

    /// Register a connection, replacing any prior one for the same identity.
    ///
    /// Returns the replaced connection, if there was one.
    pub fn register(&self, connection: Connection) -> Result<Option<Connection>, GameError> {
        if !connection.is_authenticated() {
            return Err(GameError::Unauthorized);
        }

        let _guard = self.presence.lock();
        let identity = connection.identity().clone();
        let replaced = self.connections.insert(identity.clone(), connection);

        if let Some(old) = &replaced {
            old.supersede();
            info!(identity = %identity, old_connection = %old.id(), "Connection replaced");
        } else {
            info!(identity = %identity, "Connection registered");
        }

        self.send_all(&ServerMsg::PresenceAdded { identity });
        Ok(replaced)
    }

    /// Remove a connection. Unregistering an absent or already replaced
    /// connection is a no-op and returns false.
    pub fn unregister(&self, connection: &Connection) -> bool {
        let _guard = self.presence.lock();
        let removed = self
            .connections
            .remove_if(connection.identity(), |_, current| current.id() == connection.id())
            .is_some();

        if removed {
            info!(identity = %connection.identity(), "Connection unregistered");
            self.send_all(&ServerMsg::PresenceRemoved {
                identity: connection.identity().clone(),
            });
        } else {
            debug!(
                identity = %connection.identity(),
                connection = %connection.id(),
                "Unregister ignored, connection not current"
            );
        }
        removed
    }

    /// Run `f` only while `identity` has no live connection. Presence is
    /// held for the duration, so a reconnect waits until `f` returns.
    pub fn while_absent<R>(&self, identity: &Identity, f: impl FnOnce() -> R) -> Option<R> {
        let _guard = self.presence.lock();
        if self.connections.contains_key(identity) {
            return None;
        }
        Some(f())
    }

    pub fn lookup(&self, identity: &Identity) -> Option<Connection> {
        self.connections.get(identity).map(|c| c.value().clone())
    }

    /// Snapshot of every present identity
    pub fn current(&self) -> BTreeSet<Identity> {
        self.connections.iter().map(|c| c.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Deliver to every live connection, returning how many accepted it
    pub(crate) fn send_all(&self, msg: &ServerMsg) -> usize {
        let targets: Vec<Connection> = self.connections.iter().map(|c| c.value().clone()).collect();
        targets.iter().filter(|c| c.send(msg.clone())).count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(name: &str) -> (Connection, tokio::sync::mpsc::UnboundedReceiver<ServerMsg>) {
        Connection::new(Identity::new(name), true)
    }

    #[test]
    fn unauthenticated_connection_is_rejected() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = Connection::new(Identity::new("mallory"), false);

        assert!(matches!(registry.register(conn), Err(GameError::Unauthorized)));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn register_broadcasts_presence_to_everyone() {
        let registry = ConnectionRegistry::new();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, mut bob_rx) = connect("bob");

        registry.register(alice).unwrap();
        registry.register(bob).unwrap();

        let mut alice_seen = Vec::new();
        while let Ok(ServerMsg::PresenceAdded { identity }) = alice_rx.try_recv() {
            alice_seen.push(identity.to_string());
        }
        assert_eq!(alice_seen, vec!["alice", "bob"]);
        assert!(matches!(bob_rx.try_recv(), Ok(ServerMsg::PresenceAdded { identity }) if identity.as_str() == "bob"));
        assert_eq!(
            registry.current().into_iter().map(|i| i.to_string()).collect::<Vec<_>>(),
            vec!["alice", "bob"]
        );
    }

    #[test]
    fn new_connection_replaces_prior_one() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = connect("alice");
        let (second, _rx2) = connect("alice");
        let first_id = first.id();
        let second_id = second.id();

        assert!(registry.register(first.clone()).unwrap().is_none());
        let replaced = registry.register(second).unwrap();
        assert_eq!(replaced.map(|c| c.id()), Some(first_id));
        assert_eq!(registry.len(), 1);

        // The stale socket closing must not evict its replacement
        assert!(!registry.unregister(&first));
        assert_eq!(registry.lookup(&Identity::new("alice")).map(|c| c.id()), Some(second_id));
    }

    #[test]
    fn while_absent_skips_connected_identities() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx) = connect("alice");
        registry.register(alice.clone()).unwrap();

        assert_eq!(registry.while_absent(alice.identity(), || 1), None);
        registry.unregister(&alice);
        assert_eq!(registry.while_absent(alice.identity(), || 1), Some(1));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx) = connect("alice");
        let (bob, mut bob_rx) = connect("bob");
        registry.register(alice.clone()).unwrap();
        registry.register(bob).unwrap();
        while bob_rx.try_recv().is_ok() {}

        assert!(registry.unregister(&alice));
        assert!(!registry.unregister(&alice));
        assert!(registry.lookup(alice.identity()).is_none());

        assert!(matches!(
            bob_rx.try_recv(),
            Ok(ServerMsg::PresenceRemoved { identity }) if identity.as_str() == "alice"
        ));
        assert!(bob_rx.try_recv().is_err());
    }
}
