//! Hub configuration

use std::net::SocketAddr;

use crate::store::DEFAULT_MAX_PAGE_SIZE;

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Depth of each connection's outbound frame queue
    ///
    /// The queue is the backpressure boundary: when it is full, frames to
    /// that connection are dropped rather than blocking the hub.
    pub send_queue_depth: usize,

    /// Lifetime drop budget before a slow connection is force-closed
    pub max_send_drops: u64,

    /// Cap applied to history query limits
    pub max_page_size: usize,

    /// Content of the system welcome frame sent on connect
    pub welcome_message: String,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".parse().expect("static addr"),
            max_connections: 0, // Unlimited
            send_queue_depth: 64,
            max_send_drops: 100,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            welcome_message: "Connected to chat server".to_string(),
            tcp_nodelay: true,
        }
    }
}

impl HubConfig {
    /// Create a config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the outbound queue depth (minimum 1)
    pub fn send_queue_depth(mut self, depth: usize) -> Self {
        self.send_queue_depth = depth.max(1);
        self
    }

    /// Set the slow-connection drop budget
    pub fn max_send_drops(mut self, drops: u64) -> Self {
        self.max_send_drops = drops;
        self
    }

    /// Set the history page size cap (minimum 1)
    pub fn max_page_size(mut self, max: usize) -> Self {
        self.max_page_size = max.max(1);
        self
    }

    /// Set the welcome message content
    pub fn welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = message.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.send_queue_depth, 64);
        assert_eq!(config.max_send_drops, 100);
        assert_eq!(config.max_page_size, DEFAULT_MAX_PAGE_SIZE);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = HubConfig::with_addr(addr);
        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:3002".parse().unwrap();
        let config = HubConfig::default()
            .bind(addr)
            .max_connections(50)
            .send_queue_depth(16)
            .max_send_drops(10)
            .max_page_size(25)
            .welcome_message("hi");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.send_queue_depth, 16);
        assert_eq!(config.max_send_drops, 10);
        assert_eq!(config.max_page_size, 25);
        assert_eq!(config.welcome_message, "hi");
    }

    #[test]
    fn test_queue_depth_floor() {
        let config = HubConfig::default().send_queue_depth(0);
        assert_eq!(config.send_queue_depth, 1);
    }
}
