//! Live connection registry
//!
//! Tracks the set of open connections the hub fans out to. The registry is
//! the only shared mutable state besides the store; it is read-heavy
//! (every broadcast snapshots it) so membership lives behind a `RwLock`
//! with an atomic counter for lock-free size queries.
//!
//! ```text
//!                   Arc<ConnectionRegistry>
//!                ┌────────────────────────────┐
//!                │ connections: HashMap<Id,   │
//!                │   Arc<ConnectionHandle> {  │
//!                │     outbound: mpsc::Tx,    │
//!                │   }                        │
//!                │ >                          │
//!                └─────────────┬──────────────┘
//!                              │ snapshot()
//!            ┌─────────────────┼─────────────────┐
//!            ▼                 ▼                 ▼
//!       [writer task]     [writer task]     [writer task]
//!       queue.recv()      queue.recv()      queue.recv()
//! ```
//!
//! Broadcast payloads are `Arc<String>`, so fan-out to N connections clones
//! a pointer, not the encoded frame.

pub mod handle;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

pub use handle::{ConnectionHandle, ConnectionId, ConnectionState, SendOutcome};

/// Registry of live connections
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection to the live set
    pub async fn register(&self, connection: Arc<ConnectionHandle>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id, connection).is_none() {
            self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection
    ///
    /// Idempotent: removing an id that is not present is a no-op.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let mut conns = self.connections.write().await;
        let removed = conns.remove(&id);
        if removed.is_some() {
            self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Point-in-time view of the membership for one broadcast pass
    ///
    /// Each connection appears at most once; concurrent register/unregister
    /// calls are ordered before or after the snapshot, never half-applied.
    pub async fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        let conns = self.connections.read().await;
        conns.values().cloned().collect()
    }

    /// Number of live connections, without taking the lock
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
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
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio::sync::mpsc;

    fn handle(id: ConnectionId) -> Arc<ConnectionHandle> {
        let (tx, rx) = mpsc::channel(4);
        // Keep the receiver alive for the duration of the test handle.
        std::mem::forget(rx);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000);
        Arc::new(ConnectionHandle::new(id, addr, tx))
    }

    #[tokio::test]
    async fn test_register_and_snapshot() {
        let registry = ConnectionRegistry::new();
        registry.register(handle(1)).await;
        registry.register(handle(2)).await;

        assert_eq!(registry.len(), 2);
        let mut ids: Vec<_> = registry.snapshot().await.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.register(handle(7)).await;

        assert!(registry.unregister(7).await.is_some());
        assert!(registry.unregister(7).await.is_none());
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reregister_same_id_keeps_count() {
        let registry = ConnectionRegistry::new();
        registry.register(handle(3)).await;
        registry.register(handle(3)).await;
        assert_eq!(registry.len(), 1);
    }
}
