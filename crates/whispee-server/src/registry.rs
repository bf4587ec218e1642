use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use whispee_core::ConnectionId;

use crate::connection::Connection;

/// Registry of all live WebSocket connections.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new connection and return it with the receiving end of its
    /// outbound queue.
    pub fn register(&self) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue.max(1));
        let connection = Arc::new(Connection::new(id.clone(), tx));
        self.connections.insert(id, Arc::clone(&connection));
        (connection, rx)
    }

    /// Remove a connection by ID. Unknown ids are ignored.
    pub fn deregister(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// Point-in-time copy of the live connections.
    ///
    /// The copy holds no map locks, so connections may register or
    /// deregister while a caller iterates it.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whispee_core::SessionId;

    #[test]
    fn register_and_deregister() {
        let registry = ConnectionRegistry::new(32);
        assert_eq!(registry.count(), 0);

        let (a, _rx_a) = registry.register();
        let (b, _rx_b) = registry.register();
        assert_eq!(registry.count(), 2);
        assert_ne!(a.id, b.id);

        assert!(registry.deregister(&a.id).is_some());
        assert_eq!(registry.count(), 1);
        let live: Vec<_> = registry.snapshot().iter().map(|conn| conn.id.clone()).collect();
        assert_eq!(live, vec![b.id.clone()]);

        registry.deregister(&b.id);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn deregister_unknown_is_noop() {
        let registry = ConnectionRegistry::new(32);
        let (_conn, _rx) = registry.register();
        assert!(registry.deregister(&ConnectionId::from_raw("conn_missing")).is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn snapshot_survives_concurrent_mutation() {
        let registry = ConnectionRegistry::new(32);
        let (a, _rx_a) = registry.register();
        let (_b, _rx_b) = registry.register();

        let snapshot = registry.snapshot();
        registry.deregister(&a.id);
        let (_c, _rx_c) = registry.register();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.count(), 2);
        assert!(snapshot.iter().any(|conn| conn.id == a.id));
    }

    #[test]
    fn snapshot_shares_session_binding() {
        let registry = ConnectionRegistry::new(32);
        let (conn, _rx) = registry.register();
        let snapshot = registry.snapshot();

        conn.bind_session(SessionId::from_raw("sess_x"));
        assert_eq!(snapshot[0].session_id(), Some(SessionId::from_raw("sess_x")));
    }

    #[tokio::test]
    async fn registered_connection_feeds_its_receiver() {
        let registry = ConnectionRegistry::new(2);
        let (conn, mut rx) = registry.register();
        assert!(conn.send("hello".into()));
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn queue_bound_comes_from_registry() {
        let registry = ConnectionRegistry::new(2);
        let (conn, _rx) = registry.register();
        assert!(conn.send("1".into()));
        assert!(conn.send("2".into()));
        assert!(!conn.send("3".into()));
    }
}
