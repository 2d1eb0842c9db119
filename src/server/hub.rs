//! Broadcast hub
//!
//! Accepts persistent connections, relays every inbound chat message to all
//! connected clients, and answers history queries against the store.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::store::MessageStore;

use super::config::HubConfig;
use super::connection::Connection;

/// Point-in-time hub statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Currently connected clients
    pub active_connections: usize,
    /// Total persisted messages
    pub total_messages: u64,
}

/// Chat broadcast hub
pub struct ChatHub {
    config: HubConfig,
    store: Arc<MessageStore>,
    registry: Arc<ConnectionRegistry>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl ChatHub {
    /// Create a new hub over the given store
    pub fn new(config: HubConfig, store: MessageStore) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            store: Arc::new(store),
            registry: Arc::new(ConnectionRegistry::new()),
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get a reference to the message store
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Current connection and message counts
    pub async fn stats(&self) -> Result<HubStats> {
        let store = Arc::clone(&self.store);
        let total_messages = tokio::task::spawn_blocking(move || store.count())
            .await
            .map_err(|e| {
                crate::error::StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
            })??;

        Ok(HubStats {
            active_connections: self.registry.len(),
            total_messages,
        })
    }

    /// Run the hub
    ///
    /// Binds to the configured address and blocks until shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "chat hub listening");
        self.accept_loop(&listener).await
    }

    /// Run the hub with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "chat hub listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    /// Serve connections from an already-bound listener
    ///
    /// Useful when the caller needs the actual bound address, e.g. with an
    /// ephemeral port.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.accept_loop(&listener).await
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let conn_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(conn_id, error = %e, "failed to set TCP_NODELAY");
            }
        }

        let connection = Connection::new(
            conn_id,
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
        );

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = connection.run().await {
                tracing::debug!(conn_id, error = %e, "connection error");
            }
        });
    }
}
