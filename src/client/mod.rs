//! Chat client
//!
//! Provides the client side of the chat protocol:
//! - A reconnecting [`ClientSession`] over the persistent connection
//! - Cursor-based history pagination via [`HistoryPager`]

pub mod config;
mod io;
pub mod pager;
pub mod session;

pub use config::SessionConfig;
pub use pager::HistoryPager;
pub use session::{ClientSession, HandlerId, SessionEvent, SessionState};
