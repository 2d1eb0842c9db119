//! Client session with automatic reconnection
//!
//! A session is one logical connection to the hub that survives transport
//! loss. On unexpected disconnect it retries with exponential backoff
//! (`min(base * 2^attempt, max)`) up to a configured cap, then gives up and
//! reports [`SessionEvent::ReconnectExhausted`]. Missed live broadcasts are
//! not replayed; callers re-fetch history through the pager after
//! reconnecting.
//!
//! Message handlers registered with [`ClientSession::on_message`] survive
//! reconnects and are dispatched over a snapshot, so a handler may
//! unsubscribe itself (or others) mid-dispatch safely.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::protocol::{Frame, HistoryPage, HistoryRequest, Message, MessageKind};
use crate::upload::UploadService;

use super::config::SessionConfig;
use super::io::{client_writer_loop, CLIENT_SEND_QUEUE_DEPTH};

/// Session connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and no pending attempt
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Live connection established
    Connected,
    /// Connection lost, backoff timer pending
    Reconnecting,
}

/// Lifecycle events delivered on the session's event channel
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection established (initial or after reconnect)
    Connected,
    /// Connection lost unexpectedly
    Disconnected,
    /// Reconnect scheduled
    Reconnecting {
        /// Attempt number, starting at 1
        attempt: u32,
        /// Backoff delay before the attempt
        delay: Duration,
    },
    /// Retry cap reached; the session is terminally disconnected
    ReconnectExhausted {
        /// Number of consecutive failed attempts
        attempts: u32,
    },
    /// Error frame received from the hub
    Error(String),
}

/// Id of a registered message handler
pub type HandlerId = u64;

type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

struct SessionInner {
    config: SessionConfig,
    state: Mutex<SessionState>,
    reconnect_attempt: AtomicU32,
    handlers: Mutex<Vec<(HandlerId, MessageHandler)>>,
    next_handler_id: AtomicU64,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    pending_history: Mutex<Option<oneshot::Sender<HistoryPage>>>,
    events: mpsc::Sender<SessionEvent>,
    cancel: Mutex<CancellationToken>,
}

impl SessionInner {
    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }

    /// Split a fresh socket, spawn its writer task, return the read half
    fn install(&self, stream: TcpStream, token: &CancellationToken) -> BufReader<OwnedReadHalf> {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(CLIENT_SEND_QUEUE_DEPTH);
        *self.outbound.lock() = Some(tx);
        tokio::spawn(client_writer_loop(write_half, rx, token.clone()));
        BufReader::new(read_half)
    }

    /// Drop the pending history waiter, if any; the receiver observes a
    /// transport error.
    fn fail_pending_history(&self) {
        self.pending_history.lock().take();
    }

    async fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::Message(msg) => {
                // Snapshot, so handlers may (un)subscribe during dispatch.
                let handlers: Vec<MessageHandler> = self
                    .handlers
                    .lock()
                    .iter()
                    .map(|(_, h)| Arc::clone(h))
                    .collect();
                for handler in handlers {
                    handler(&msg);
                }
            }
            Frame::HistoryResponse(page) => {
                match self.pending_history.lock().take() {
                    Some(tx) => {
                        let _ = tx.send(page);
                    }
                    None => tracing::debug!("unsolicited history response"),
                }
            }
            Frame::Error(err) => {
                tracing::warn!(content = %err.content, "error frame from hub");
                self.emit(SessionEvent::Error(err.content)).await;
            }
            Frame::HistoryRequest(_) => {
                tracing::debug!("unexpected frame direction");
            }
        }
    }
}

/// A logical connection to the hub, surviving transport reconnects
pub struct ClientSession {
    inner: Arc<SessionInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ClientSession {
    /// Create a session.
    ///
    /// Returns the session and a receiver for lifecycle events. The session
    /// starts disconnected; call [`ClientSession::connect`].
    pub fn new(config: SessionConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(256);

        let session = Self {
            inner: Arc::new(SessionInner {
                config,
                state: Mutex::new(SessionState::Disconnected),
                reconnect_attempt: AtomicU32::new(0),
                handlers: Mutex::new(Vec::new()),
                next_handler_id: AtomicU64::new(1),
                outbound: Mutex::new(None),
                pending_history: Mutex::new(None),
                events: tx,
                cancel: Mutex::new(CancellationToken::new()),
            }),
            driver: Mutex::new(None),
        };

        (session, rx)
    }

    /// Current connection state
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Whether the session currently has a live connection
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Current consecutive failed reconnect attempts
    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.reconnect_attempt.load(Ordering::Relaxed)
    }

    /// Establish the connection
    ///
    /// On failure the session stays disconnected and no automatic retries
    /// happen; the reconnect loop only engages on loss of an established
    /// connection. A concurrent [`ClientSession::disconnect`] cancels the
    /// attempt and the session stays disconnected.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                SessionState::Connected => return Ok(()),
                SessionState::Connecting | SessionState::Reconnecting => {
                    return Err(TransportError::ConnectInProgress.into());
                }
                SessionState::Disconnected => *state = SessionState::Connecting,
            }
        }

        // Fresh token per logical connection; a previous disconnect() has
        // cancelled the old one.
        let token = CancellationToken::new();
        *self.inner.cancel.lock() = token.clone();

        match TcpStream::connect(self.inner.config.addr.as_str()).await {
            Ok(stream) => {
                // A disconnect() racing the connect await wins: the socket
                // is discarded and the session stays disconnected.
                if token.is_cancelled() {
                    drop(stream);
                    self.inner.set_state(SessionState::Disconnected);
                    return Err(TransportError::Cancelled.into());
                }
                let reader = self.inner.install(stream, &token);
                self.inner.reconnect_attempt.store(0, Ordering::Relaxed);
                self.inner.set_state(SessionState::Connected);
                self.inner.emit(SessionEvent::Connected).await;
                tracing::info!(addr = %self.inner.config.addr, "connected");

                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(drive(inner, reader, token));
                *self.driver.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.inner.set_state(SessionState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Tear the session down
    ///
    /// Cancels any pending reconnect timer and transitions to disconnected.
    /// Idempotent; callable from any state.
    pub fn disconnect(&self) {
        self.inner.cancel.lock().cancel();
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
        self.inner.outbound.lock().take();
        self.inner.fail_pending_history();
        self.inner.set_state(SessionState::Disconnected);
        let _ = self.inner.events.try_send(SessionEvent::Disconnected);
    }

    /// Subscribe to inbound messages
    ///
    /// The subscription survives reconnects; remove it with
    /// [`ClientSession::remove_handler`].
    pub fn on_message<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Unsubscribe a handler. Safe to call from inside a handler.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    /// Send a chat message
    ///
    /// Fails with [`TransportError::NotConnected`] when no live connection
    /// exists; messages are never queued across a disconnect.
    pub async fn send(&self, message: Message) -> Result<()> {
        message.validate()?;
        self.send_frame(Frame::Message(message)).await
    }

    /// Request a page of history
    ///
    /// At most one request may be outstanding per session; callers
    /// serialize (`HistoryPager` does this by construction).
    pub async fn request_history(
        &self,
        limit: usize,
        before: Option<i64>,
    ) -> Result<HistoryPage> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending_history.lock();
            if pending.is_some() {
                return Err(TransportError::RequestPending.into());
            }
            *pending = Some(tx);
        }

        if let Err(e) = self
            .send_frame(Frame::HistoryRequest(HistoryRequest { limit, before }))
            .await
        {
            self.inner.fail_pending_history();
            return Err(e);
        }

        rx.await
            .map_err(|_| Error::Transport(TransportError::PeerClosed))
    }

    /// Upload a file and send the resulting attachment message
    ///
    /// The upload is awaited in the caller's task; neither the hub nor this
    /// session's read loop waits on it.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_file(
        &self,
        uploader: &dyn UploadService,
        kind: MessageKind,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        file_name: &str,
        content_type: &str,
        data: Bytes,
        timestamp: i64,
    ) -> Result<()> {
        if !matches!(kind, MessageKind::Audio | MessageKind::Video) {
            return Err(ProtocolError::InvalidMessage(format!(
                "{kind} message cannot carry an attachment"
            ))
            .into());
        }

        let uploaded = uploader.upload(file_name, content_type, data).await?;
        let message = Message::with_attachment(
            kind,
            sender_id,
            sender_name,
            uploaded.into_attachment(),
            timestamp,
        );
        self.send(message).await
    }

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        if self.state() != SessionState::Connected {
            return Err(TransportError::NotConnected.into());
        }
        let sender = self
            .inner
            .outbound
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let line = frame.encode()?;
        sender
            .send(line)
            .await
            .map_err(|_| Error::Transport(TransportError::PeerClosed))
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.inner.cancel.lock().cancel();
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}

/// Drive the session: read frames, and on loss run the backoff loop
async fn drive(
    inner: Arc<SessionInner>,
    mut reader: BufReader<OwnedReadHalf>,
    token: CancellationToken,
) {
    loop {
        read_frames(&inner, &mut reader, &token).await;

        inner.outbound.lock().take();
        inner.fail_pending_history();
        if token.is_cancelled() {
            return;
        }

        inner.set_state(SessionState::Reconnecting);
        inner.emit(SessionEvent::Disconnected).await;
        tracing::info!("connection lost");

        loop {
            let attempt = inner.reconnect_attempt.fetch_add(1, Ordering::Relaxed) + 1;
            if attempt > inner.config.max_reconnect_attempts {
                // Terminal: no further automatic attempts.
                inner.set_state(SessionState::Disconnected);
                let attempts = inner.config.max_reconnect_attempts;
                tracing::error!(attempts, "max reconnection attempts reached");
                inner.emit(SessionEvent::ReconnectExhausted { attempts }).await;
                return;
            }

            let delay = inner.config.backoff_delay(attempt);
            tracing::info!(
                attempt,
                max = inner.config.max_reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            );
            inner.emit(SessionEvent::Reconnecting { attempt, delay }).await;

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            inner.set_state(SessionState::Connecting);
            match TcpStream::connect(inner.config.addr.as_str()).await {
                Ok(stream) => {
                    if token.is_cancelled() {
                        return;
                    }
                    reader = inner.install(stream, &token);
                    inner.reconnect_attempt.store(0, Ordering::Relaxed);
                    inner.set_state(SessionState::Connected);
                    inner.emit(SessionEvent::Connected).await;
                    tracing::info!(addr = %inner.config.addr, "reconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                    inner.set_state(SessionState::Reconnecting);
                }
            }
        }
    }
}

/// Read frames until the connection drops or close is requested
async fn read_frames(
    inner: &Arc<SessionInner>,
    reader: &mut BufReader<OwnedReadHalf>,
    token: &CancellationToken,
) {
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = token.cancelled() => return,
            read = reader.read_line(&mut line) => read,
        };

        match read {
            Ok(0) => return, // EOF
            Ok(_) => {
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                match Frame::decode(trimmed) {
                    Ok(frame) => inner.dispatch(frame).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed frame");
                    }
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "read failed");
                return;
            }
        }
    }
}
