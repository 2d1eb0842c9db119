//! Chat wire protocol
//!
//! Frames are JSON objects, one per line, sent over the persistent
//! connection in both directions. Every frame carries a `type` field that
//! selects how the rest of the object is interpreted:
//!
//! - `text` / `audio` / `video` / `system`: a chat [`Message`]
//! - `history`: history request (client to hub) or response (hub to client)
//! - `error`: error indication from the hub to the originating connection
//!
//! Field names on the wire are camelCase (`userId`, `fileUrl`, `hasMore`)
//! to stay compatible with existing clients.

pub mod frame;
pub mod message;

pub use frame::{ErrorFrame, Frame, HistoryPage, HistoryRequest};
pub use message::{Attachment, Message, MessageKind};
