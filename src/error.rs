//! Error types
//!
//! Errors are split by subsystem so callers can tell a bad frame from a
//! storage failure from a dead peer. A failure in one connection's handling
//! never propagates to another connection.

use thiserror::Error;

/// Convenience result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or invalid frame
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Message store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Connection-level send/receive failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The client session gave up reconnecting after the configured cap.
    ///
    /// Terminal: the session makes no further automatic attempts.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted {
        /// Number of consecutive failed attempts
        attempts: u32,
    },
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(TransportError::Io(e))
    }
}

/// Malformed wire input
///
/// A protocol error drops the offending frame but never terminates the
/// connection it arrived on.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame was not valid JSON
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// Frame had no `type` field
    #[error("frame has no type field")]
    MissingFrameType,

    /// Frame `type` was not one of the known values
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    /// Message violated the content/attachment invariant for its kind
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Message store failure
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying SQLite error
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// `query` was called with `limit == 0`
    #[error("query limit must be greater than zero")]
    InvalidLimit,

    /// Filesystem error opening the database
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The store mutex was poisoned by a panicking writer
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Connection-level transport failure
///
/// Affects exactly one connection; during broadcast fan-out the failed
/// recipient is removed and the rest of the pass continues.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires an established connection
    #[error("not connected")]
    NotConnected,

    /// A connection attempt is already in progress
    #[error("connection attempt already in progress")]
    ConnectInProgress,

    /// The connection attempt was cancelled by `disconnect`
    #[error("connection attempt cancelled")]
    Cancelled,

    /// The remote end closed the connection
    #[error("peer closed the connection")]
    PeerClosed,

    /// A history request is already outstanding on this session
    #[error("history request already outstanding")]
    RequestPending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(TransportError::NotConnected);
        assert_eq!(err.to_string(), "transport error: not connected");

        let err = Error::ReconnectExhausted { attempts: 5 };
        assert_eq!(
            err.to_string(),
            "reconnect attempts exhausted after 5 tries"
        );
    }

    #[test]
    fn test_io_error_maps_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: Error = io.into();
        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
    }
}
