//! Per-connection handle stored in the registry
//!
//! A handle wraps the bounded send queue feeding a connection's writer task.
//! The queue is the backpressure boundary: a stalled peer fills its own
//! queue and starts dropping frames without blocking the hub or any other
//! connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Unique id of a live connection
pub type ConnectionId = u64;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered and receiving broadcasts
    Open,
    /// Close requested, reader and writer tasks shutting down; frames
    /// still in the queue are discarded
    Closing,
    /// Transport gone
    Closed,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Outcome of a non-blocking send into a connection's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame enqueued
    Sent,
    /// Queue full; frame dropped, lifetime drop count returned
    QueueFull {
        /// Total frames dropped on this connection so far
        drops: u64,
    },
    /// Writer side is gone
    Closed,
}

/// Handle to a live connection, owned by the registry for its lifetime
pub struct ConnectionHandle {
    /// Connection id, unique for the lifetime of the hub process
    pub id: ConnectionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    outbound: mpsc::Sender<Arc<String>>,
    state: AtomicU8,
    drops: AtomicU64,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle around a writer queue
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, outbound: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            peer_addr,
            outbound,
            state: AtomicU8::new(ConnectionState::Open as u8),
            drops: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Enqueue an encoded frame without blocking
    pub fn send(&self, frame: Arc<String>) -> SendOutcome {
        if self.state() != ConnectionState::Open {
            return SendOutcome::Closed;
        }
        match self.outbound.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => {
                let drops = self.drops.fetch_add(1, Ordering::Relaxed) + 1;
                SendOutcome::QueueFull { drops }
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Lifetime count of frames dropped because the queue was full
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Request the connection to close
    ///
    /// Idempotent. Wakes the connection's reader and writer tasks.
    pub fn close(&self) {
        self.state
            .store(ConnectionState::Closing as u8, Ordering::Relaxed);
        self.closed.cancel();
    }

    /// Mark the transport fully gone
    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Relaxed);
        self.closed.cancel();
    }

    /// Token cancelled once close has been requested
    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .field("drops", &self.drop_count())
            .finish()
    }
}
