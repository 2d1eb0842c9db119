//! Real-time chat transport: broadcast hub server and reconnecting client.
//!
//! The hub accepts persistent connections, persists every chat message to
//! an append-only SQLite log, and fans it out to all connected clients.
//! History is served through cursor-based pagination over the same
//! connection. The client session tolerates transient network loss with
//! exponential-backoff reconnection.
//!
//! # Server
//!
//! ```no_run
//! use chathub::{ChatHub, HubConfig, MessageStore};
//!
//! # async fn example() -> chathub::Result<()> {
//! let store = MessageStore::open("data/chat.db")?;
//! let config = HubConfig::default().bind("0.0.0.0:3001".parse().unwrap());
//! let hub = ChatHub::new(config, store);
//! hub.run().await
//! # }
//! ```
//!
//! # Client
//!
//! ```no_run
//! use chathub::{ClientSession, Message, SessionConfig};
//!
//! # async fn example() -> chathub::Result<()> {
//! let (session, mut events) = ClientSession::new(SessionConfig::new("127.0.0.1:3001"));
//! session.on_message(|msg| println!("{}: {:?}", msg.sender_name, msg.content));
//! session.connect().await?;
//! session.send(Message::text("u1", "alice", "hello", 1_700_000_000_000)).await?;
//! # let _ = events.recv().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees
//!
//! - Messages from one connection are broadcast in arrival order, and are
//!   appended to the store before anyone sees them.
//! - A failed or slow recipient is removed without disturbing delivery to
//!   the rest.
//! - Malformed frames are dropped; they never terminate a connection.
//! - History pages partition the log ordered by `(timestamp, id)`.

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;
pub mod upload;

pub use client::{ClientSession, HistoryPager, SessionConfig, SessionEvent, SessionState};
pub use error::{Error, ProtocolError, Result, StorageError, TransportError};
pub use protocol::{Attachment, Frame, HistoryPage, HistoryRequest, Message, MessageKind};
pub use registry::ConnectionRegistry;
pub use server::{ChatHub, HubConfig, HubStats};
pub use store::MessageStore;
pub use upload::{UploadService, UploadedFile};
