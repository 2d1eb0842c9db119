//! Chat hub server
//!
//! TCP accept loop, per-connection reader/writer tasks, and broadcast
//! fan-out. Connections are independent: one peer's failure, slowness, or
//! garbage input never affects the others.

pub mod config;
mod connection;
mod hub;

pub use config::HubConfig;
pub use hub::{ChatHub, HubStats};
