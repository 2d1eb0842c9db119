//! Per-connection handling
//!
//! Each accepted socket gets a reader loop (this module) plus a writer task
//! fed by the bounded queue inside its [`ConnectionHandle`]. The reader
//! processes inbound frames strictly in arrival order, which gives the
//! per-sender broadcast ordering guarantee: a message is appended to the
//! store and fanned out before the next frame from the same connection is
//! even parsed.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::{ErrorFrame, Frame, HistoryPage, HistoryRequest, Message, MessageKind};
use crate::registry::{ConnectionHandle, ConnectionRegistry, SendOutcome};
use crate::store::MessageStore;

use super::config::HubConfig;

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionPhase {
    /// Socket accepted, welcome not yet sent
    Handshaking,
    /// Registered and relaying
    Open,
    /// Tearing down
    Closing,
    /// Done
    Closed,
}

/// State for one accepted connection
pub(crate) struct Connection {
    id: u64,
    peer_addr: SocketAddr,
    phase: ConnectionPhase,
    config: HubConfig,
    store: Arc<MessageStore>,
    registry: Arc<ConnectionRegistry>,
    handle: Arc<ConnectionHandle>,
    reader: BufReader<OwnedReadHalf>,
}

impl Connection {
    /// Wrap an accepted socket, spawning its writer task
    pub(crate) fn new(
        id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: HubConfig,
        store: Arc<MessageStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let (read_half, write_half) = socket.into_split();
        let (tx, rx) = mpsc::channel(config.send_queue_depth);
        let handle = Arc::new(ConnectionHandle::new(id, peer_addr, tx));

        tokio::spawn(writer_loop(write_half, rx, Arc::clone(&handle)));

        Self {
            id,
            peer_addr,
            phase: ConnectionPhase::Handshaking,
            config,
            store,
            registry,
            handle,
            reader: BufReader::new(read_half),
        }
    }

    /// Run the connection until the peer goes away or close is requested
    pub(crate) async fn run(mut self) -> Result<()> {
        // Welcome goes into the queue before registration, so it is always
        // the first frame the client sees. Not persisted.
        let welcome = Frame::Message(Message::system(self.config.welcome_message.clone()));
        self.send_to_self(&welcome);

        self.registry.register(Arc::clone(&self.handle)).await;
        self.phase = ConnectionPhase::Open;
        tracing::info!(
            conn_id = self.id,
            peer = %self.peer_addr,
            clients = self.registry.len(),
            "client connected"
        );

        let result = self.read_loop().await;

        self.phase = ConnectionPhase::Closing;
        self.registry.unregister(self.id).await;
        self.handle.mark_closed();
        self.phase = ConnectionPhase::Closed;
        tracing::info!(
            conn_id = self.id,
            clients = self.registry.len(),
            "client disconnected"
        );

        result
    }

    async fn read_loop(&mut self) -> Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = self.handle.closed_token().cancelled() => return Ok(()),
                read = self.reader.read_line(&mut line) => read,
            };

            match read {
                Ok(0) => return Ok(()), // EOF
                Ok(_) => {
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() {
                        continue;
                    }
                    self.handle_line(trimmed).await;
                }
                Err(e) => {
                    tracing::debug!(conn_id = self.id, error = %e, "read failed");
                    return Ok(());
                }
            }
        }
    }

    /// Dispatch one inbound frame. Malformed input is logged and dropped;
    /// it never terminates the connection.
    async fn handle_line(&mut self, line: &str) {
        match Frame::decode(line) {
            Ok(Frame::Message(msg)) => self.handle_message(msg).await,
            Ok(Frame::HistoryRequest(req)) => self.handle_history(req).await,
            Ok(other) => {
                tracing::debug!(conn_id = self.id, frame = ?other, "unexpected frame direction");
            }
            Err(e) => {
                tracing::warn!(conn_id = self.id, error = %e, "dropping malformed frame");
            }
        }
    }

    async fn handle_message(&mut self, mut msg: Message) {
        if let Err(e) = msg.validate() {
            tracing::warn!(conn_id = self.id, error = %e, "rejecting invalid message");
            self.send_error(e.to_string());
            return;
        }

        // Persist everything except system chatter. Delivery without
        // durability is disallowed: if the append fails, nobody else ever
        // sees the message and the sender gets an error frame.
        if msg.kind != MessageKind::System {
            let store = Arc::clone(&self.store);
            let record = msg.clone();
            let appended =
                tokio::task::spawn_blocking(move || store.append(&record)).await;

            match appended {
                Ok(Ok(id)) => msg.id = Some(id),
                Ok(Err(e)) => {
                    tracing::error!(conn_id = self.id, error = %e, "append failed, suppressing broadcast");
                    self.send_error("failed to save message");
                    return;
                }
                Err(e) => {
                    tracing::error!(conn_id = self.id, error = %e, "append task failed");
                    self.send_error("failed to save message");
                    return;
                }
            }
        }

        self.broadcast(Frame::Message(msg)).await;
    }

    /// Fan a frame out to the current registry snapshot
    ///
    /// A recipient whose queue is gone, or that has exhausted its drop
    /// budget, is closed and unregistered; delivery to the rest of the
    /// snapshot continues regardless.
    async fn broadcast(&self, frame: Frame) {
        let encoded = match frame.encode() {
            Ok(line) => Arc::new(line),
            Err(e) => {
                tracing::error!(conn_id = self.id, error = %e, "failed to encode frame");
                return;
            }
        };

        let snapshot = self.registry.snapshot().await;
        let recipients = snapshot.len();
        for conn in snapshot {
            match conn.send(Arc::clone(&encoded)) {
                SendOutcome::Sent => {}
                SendOutcome::QueueFull { drops } if drops >= self.config.max_send_drops => {
                    tracing::warn!(conn_id = conn.id, drops, "disconnecting slow client");
                    conn.close();
                    self.registry.unregister(conn.id).await;
                }
                SendOutcome::QueueFull { drops } => {
                    tracing::warn!(conn_id = conn.id, drops, "queue full, frame dropped");
                }
                SendOutcome::Closed => {
                    tracing::debug!(conn_id = conn.id, "removing dead connection");
                    self.registry.unregister(conn.id).await;
                }
            }
        }
        tracing::debug!(conn_id = self.id, recipients, "broadcast frame");
    }

    /// Answer a history request on this connection only; the registry is
    /// not involved.
    async fn handle_history(&mut self, req: HistoryRequest) {
        if req.limit == 0 {
            self.send_error("limit must be greater than zero");
            return;
        }
        let limit = req.limit.min(self.config.max_page_size);
        let before = req.before;

        let store = Arc::clone(&self.store);
        let queried = tokio::task::spawn_blocking(move || {
            let messages = store.query(limit, before)?;
            let total = store.count()?;
            Ok::<_, crate::error::StorageError>((messages, total))
        })
        .await;

        let (messages, total) = match queried {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(conn_id = self.id, error = %e, "history query failed");
                self.send_error("failed to fetch messages");
                return;
            }
            Err(e) => {
                tracing::error!(conn_id = self.id, error = %e, "history task failed");
                self.send_error("failed to fetch messages");
                return;
            }
        };

        let has_more = match before {
            Some(_) => messages.len() == limit,
            None => total > limit as u64,
        };

        self.send_to_self(&Frame::HistoryResponse(HistoryPage {
            messages,
            total,
            has_more,
        }));
    }

    fn send_error(&self, content: impl Into<String>) {
        self.send_to_self(&Frame::Error(ErrorFrame {
            content: content.into(),
        }));
    }

    fn send_to_self(&self, frame: &Frame) {
        match frame.encode() {
            Ok(line) => match self.handle.send(Arc::new(line)) {
                SendOutcome::Sent => {}
                SendOutcome::QueueFull { drops } => {
                    tracing::warn!(conn_id = self.id, drops, "queue full, reply to originator dropped");
                }
                SendOutcome::Closed => {
                    tracing::debug!(conn_id = self.id, "connection closed, reply to originator dropped");
                }
            },
            Err(e) => {
                tracing::error!(conn_id = self.id, error = %e, "failed to encode frame");
            }
        }
    }
}

/// Drain the outbound queue onto the socket
///
/// Exits when the queue closes, close is requested, or a write fails. A
/// write failure marks the handle closed so the next broadcast pass
/// unregisters the connection.
async fn writer_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Arc<String>>,
    handle: Arc<ConnectionHandle>,
) {
    loop {
        let frame = tokio::select! {
            _ = handle.closed_token().cancelled() => break,
            frame = outbound.recv() => frame,
        };
        let Some(line) = frame else { break };

        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = write.await {
            tracing::debug!(conn_id = handle.id, error = %e, "write failed");
            handle.mark_closed();
            break;
        }
    }
    let _ = writer.shutdown().await;
}
