//! Durable message store
//!
//! Append-only SQLite log of chat messages. Ids are assigned by SQLite's
//! rowid on insert, monotonically increasing and never reused. Retrieval is
//! keyed on the sender-supplied `timestamp` (not insertion time) with `id`
//! breaking ties, backed by a descending index so page queries stay cheap
//! under concurrent writes.
//!
//! The store is synchronous; async callers wrap calls in
//! `tokio::task::spawn_blocking` (see the hub's append path).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, Row};

use crate::error::StorageError;
use crate::protocol::{Attachment, Message, MessageKind};

/// Default cap on messages returned by a single query
pub const DEFAULT_MAX_PAGE_SIZE: usize = 200;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    user_name TEXT NOT NULL,
    content TEXT,
    type TEXT NOT NULL,
    file_url TEXT,
    file_name TEXT,
    file_size INTEGER,
    timestamp INTEGER NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp DESC);
";

/// Append-only message log
pub struct MessageStore {
    conn: Mutex<Connection>,
    max_page_size: usize,
}

impl MessageStore {
    /// Open (or create) a file-backed store
    ///
    /// Parent directories are created if missing. The database runs in WAL
    /// mode so history queries proceed alongside appends.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store, used by tests and demos
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        })
    }

    /// Override the per-query page size cap
    pub fn with_max_page_size(mut self, max: usize) -> Self {
        self.max_page_size = max.max(1);
        self
    }

    /// The per-query page size cap
    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Persist a message and return its assigned id
    ///
    /// The insert is atomic; on error nothing is observable and the caller
    /// must not broadcast the message.
    pub fn append(&self, message: &Message) -> Result<i64, StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (user_id, user_name, content, type, file_url, file_name, file_size, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.sender_id,
                message.sender_name,
                message.content,
                message.kind.as_str(),
                message.attachment.as_ref().map(|a| a.url.as_str()),
                message.attachment.as_ref().map(|a| a.name.as_str()),
                message.attachment.as_ref().map(|a| a.size_bytes),
                message.timestamp,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch up to `limit` messages, oldest to newest in the result
    ///
    /// With `before` set, only messages with `timestamp` strictly older are
    /// returned; otherwise the most recent `limit`. `limit` must be greater
    /// than zero and is clamped to [`MessageStore::max_page_size`].
    ///
    /// Known limitation: the cursor is timestamp-only, so messages sharing
    /// the cursor's timestamp that straddle a page boundary are skipped by
    /// the next page. Backward paging partitions the history cleanly only
    /// when timestamps at page boundaries are distinct.
    pub fn query(&self, limit: usize, before: Option<i64>) -> Result<Vec<Message>, StorageError> {
        if limit == 0 {
            return Err(StorageError::InvalidLimit);
        }
        let limit = limit.min(self.max_page_size) as i64;
        let conn = self.lock()?;

        let mut messages = match before {
            Some(ts) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, user_id, user_name, content, type, file_url, file_name, file_size, timestamp
                     FROM messages WHERE timestamp < ?1
                     ORDER BY timestamp DESC, id DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![ts, limit], row_to_message)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, user_id, user_name, content, type, file_url, file_name, file_size, timestamp
                     FROM messages
                     ORDER BY timestamp DESC, id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], row_to_message)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        // Newest-first internally, chronological for the caller.
        messages.reverse();
        Ok(messages)
    }

    /// Total number of persisted messages
    pub fn count(&self) -> Result<u64, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Remove all messages. Irreversible; maintenance only.
    pub fn clear(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM messages", [])?;
        Ok(())
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let kind_str: String = row.get(4)?;
    let kind = MessageKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown message kind: {kind_str}").into(),
        )
    })?;

    let file_url: Option<String> = row.get(5)?;
    let attachment = file_url.map(|url| {
        Ok::<_, rusqlite::Error>(Attachment {
            url,
            name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            size_bytes: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        })
    });
    let attachment = attachment.transpose()?;

    Ok(Message {
        id: Some(row.get(0)?),
        sender_id: row.get(1)?,
        sender_name: row.get(2)?,
        content: row.get(3)?,
        kind,
        attachment,
        timestamp: row.get(8)?,
    })
}
