//! Backward pagination over message history
//!
//! The pager walks history from newest to oldest using the timestamp of the
//! oldest already-seen message as the exclusive cursor for the next page.
//! Holding `&mut self` across [`HistoryPager::load_older`] means the
//! one-outstanding-request discipline is enforced by the borrow checker.

use crate::error::Result;
use crate::protocol::Message;

use super::session::ClientSession;

/// Cursor-based pager over the hub's message history
pub struct HistoryPager<'a> {
    session: &'a ClientSession,
    page_size: usize,
    cursor: Option<i64>,
    has_more: bool,
    started: bool,
}

impl<'a> HistoryPager<'a> {
    /// Create a pager fetching `page_size` messages per call
    pub fn new(session: &'a ClientSession, page_size: usize) -> Self {
        Self {
            session,
            page_size,
            cursor: None,
            has_more: false,
            started: false,
        }
    }

    /// Load the next (older) page, oldest-to-newest within the page
    ///
    /// The first call fetches the most recent messages; later calls fetch
    /// strictly older ones. Returns an empty vec once history is exhausted.
    ///
    /// The cursor is timestamp-only: messages sharing the oldest-seen
    /// timestamp that fall just beyond a page boundary are skipped by the
    /// next page. See [`crate::store::MessageStore::query`].
    pub async fn load_older(&mut self) -> Result<Vec<Message>> {
        if self.started && !self.has_more {
            return Ok(Vec::new());
        }

        let page = self
            .session
            .request_history(self.page_size, self.cursor)
            .await?;

        self.started = true;
        self.has_more = page.has_more;
        if let Some(oldest) = page.messages.first() {
            self.cursor = Some(oldest.timestamp);
        }
        Ok(page.messages)
    }

    /// Whether another `load_older` call can return messages
    pub fn has_more(&self) -> bool {
        !self.started || self.has_more
    }

    /// Timestamp cursor of the oldest message seen so far
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }
}
