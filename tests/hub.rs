//! End-to-end hub tests over real sockets
//!
//! Each test binds a hub to an ephemeral port and talks to it through
//! `ClientSession` or a raw line-frame client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use chathub::{
    Attachment, ChatHub, ClientSession, Frame, HistoryPager, HubConfig, Message, MessageKind,
    MessageStore, Result, SessionConfig, SessionEvent, UploadService, UploadedFile,
};

const WAIT: Duration = Duration::from_secs(5);

async fn start_hub(config: HubConfig) -> (SocketAddr, Arc<ChatHub>) {
    let store = MessageStore::in_memory().unwrap();
    let hub = Arc::new(ChatHub::new(config, store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = Arc::clone(&hub);
    tokio::spawn(async move {
        let _ = serving.serve(listener).await;
    });

    (addr, hub)
}

async fn connected_session(
    addr: SocketAddr,
) -> (
    ClientSession,
    mpsc::Receiver<SessionEvent>,
    mpsc::UnboundedReceiver<Message>,
) {
    let (session, events) = ClientSession::new(SessionConfig::new(addr.to_string()));
    let (tx, rx) = mpsc::unbounded_channel();
    session.on_message(move |msg| {
        let _ = tx.send(msg.clone());
    });
    session.connect().await.unwrap();
    (session, events, rx)
}

async fn recv_message(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

/// Minimal client speaking raw line frames, for malformed-input tests
struct RawClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn read_frame(&mut self) -> Frame {
        let mut line = String::new();
        timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        Frame::decode(line.trim_end()).unwrap()
    }
}

#[tokio::test]
async fn test_welcome_then_broadcast_reaches_everyone() {
    let (addr, hub) = start_hub(HubConfig::default()).await;
    let (a, _a_events, mut a_rx) = connected_session(addr).await;
    let (_b, _b_events, mut b_rx) = connected_session(addr).await;

    // First frame on every connection is the non-persisted system welcome.
    let welcome = recv_message(&mut a_rx).await;
    assert_eq!(welcome.kind, MessageKind::System);
    assert_eq!(welcome.content.as_deref(), Some("Connected to chat server"));
    let welcome = recv_message(&mut b_rx).await;
    assert_eq!(welcome.kind, MessageKind::System);

    a.send(Message::text("u1", "alice", "hello", 1000))
        .await
        .unwrap();

    // Both the other client and the sender itself receive the broadcast,
    // carrying the store-assigned id.
    let got = recv_message(&mut b_rx).await;
    assert_eq!(got.content.as_deref(), Some("hello"));
    assert!(got.id.is_some());
    let echo = recv_message(&mut a_rx).await;
    assert_eq!(echo.id, got.id);

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.active_connections, 2);
    assert_eq!(stats.total_messages, 1);
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let (addr, hub) = start_hub(HubConfig::default()).await;
    let mut raw = RawClient::connect(addr).await;
    raw.read_frame().await; // welcome

    raw.send_line("{this is not json").await;
    raw.send_line(r#"{"content":"missing type"}"#).await;

    // The connection survived: a valid frame still round-trips.
    raw.send_line(
        r#"{"userId":"u1","userName":"alice","content":"still here","type":"text","timestamp":7}"#,
    )
    .await;

    match raw.read_frame().await {
        Frame::Message(msg) => {
            assert_eq!(msg.content.as_deref(), Some("still here"));
            assert!(msg.id.is_some());
        }
        other => panic!("expected broadcast message, got {other:?}"),
    }
    assert_eq!(hub.registry().len(), 1);
}

#[tokio::test]
async fn test_invalid_message_rejected_before_persistence() {
    let (addr, hub) = start_hub(HubConfig::default()).await;
    let (_a, _a_events, mut a_rx) = connected_session(addr).await;
    recv_message(&mut a_rx).await; // welcome

    let mut raw = RawClient::connect(addr).await;
    raw.read_frame().await; // welcome

    // Text message with attachment fields violates the invariant.
    raw.send_line(
        r#"{"userId":"u1","userName":"alice","content":"x","type":"text","fileUrl":"/u/a","fileName":"a","fileSize":1,"timestamp":5}"#,
    )
    .await;

    // Originator gets an error frame; nothing is persisted or broadcast.
    match raw.read_frame().await {
        Frame::Error(err) => assert!(err.content.contains("invalid message")),
        other => panic!("expected error frame, got {other:?}"),
    }
    assert_eq!(hub.store().count().unwrap(), 0);
    assert!(timeout(Duration::from_millis(200), a_rx.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_system_messages_relayed_but_not_persisted() {
    let (addr, hub) = start_hub(HubConfig::default()).await;
    let (_a, _a_events, mut a_rx) = connected_session(addr).await;
    recv_message(&mut a_rx).await; // welcome

    let mut raw = RawClient::connect(addr).await;
    raw.read_frame().await; // welcome

    raw.send_line(r#"{"type":"system","content":"maintenance soon"}"#)
        .await;

    let got = recv_message(&mut a_rx).await;
    assert_eq!(got.kind, MessageKind::System);
    assert_eq!(got.content.as_deref(), Some("maintenance soon"));
    assert!(got.id.is_none());
    assert_eq!(hub.store().count().unwrap(), 0);
}

#[tokio::test]
async fn test_history_pagination_scenario() {
    let (addr, hub) = start_hub(HubConfig::default()).await;
    for ts in [100, 200, 300] {
        hub.store()
            .append(&Message::text("u1", "alice", format!("m{ts}"), ts))
            .unwrap();
    }

    let (session, _events, _rx) = connected_session(addr).await;

    let page = session.request_history(2, None).await.unwrap();
    let ts: Vec<i64> = page.messages.iter().map(|m| m.timestamp).collect();
    assert_eq!(ts, vec![200, 300]);
    assert_eq!(page.total, 3);
    assert!(page.has_more);

    let page = session.request_history(2, Some(200)).await.unwrap();
    let ts: Vec<i64> = page.messages.iter().map(|m| m.timestamp).collect();
    assert_eq!(ts, vec![100]);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_pager_walks_full_history() {
    let (addr, hub) = start_hub(HubConfig::default()).await;
    for ts in [10, 20, 30, 40, 50] {
        hub.store()
            .append(&Message::text("u1", "alice", format!("m{ts}"), ts))
            .unwrap();
    }

    let (session, _events, _rx) = connected_session(addr).await;
    let mut pager = HistoryPager::new(&session, 2);

    let ts = |msgs: &[Message]| msgs.iter().map(|m| m.timestamp).collect::<Vec<_>>();

    let page = pager.load_older().await.unwrap();
    assert_eq!(ts(&page), vec![40, 50]);
    assert!(pager.has_more());

    let page = pager.load_older().await.unwrap();
    assert_eq!(ts(&page), vec![20, 30]);

    let page = pager.load_older().await.unwrap();
    assert_eq!(ts(&page), vec![10]);
    assert!(!pager.has_more());

    assert!(pager.load_older().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dead_peer_removed_others_still_receive() {
    let (addr, hub) = start_hub(HubConfig::default()).await;
    let (a, _a_events, mut a_rx) = connected_session(addr).await;
    recv_message(&mut a_rx).await; // welcome

    let mut raw = RawClient::connect(addr).await;
    raw.read_frame().await; // welcome
    drop(raw);

    // The hub notices the closed peer and unregisters it.
    timeout(WAIT, async {
        while hub.registry().len() > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    a.send(Message::text("u1", "alice", "anyone there", 42))
        .await
        .unwrap();
    let got = recv_message(&mut a_rx).await;
    assert_eq!(got.content.as_deref(), Some("anyone there"));
}

#[tokio::test]
async fn test_connection_limit_rejects_excess() {
    let (addr, _hub) = start_hub(HubConfig::default().max_connections(1)).await;

    let mut first = RawClient::connect(addr).await;
    first.read_frame().await; // welcome

    // The second connection is dropped without a welcome.
    let second = TcpStream::connect(addr).await.unwrap();
    let mut reader = BufReader::new(second);
    let mut line = String::new();
    let read = timeout(WAIT, reader.read_line(&mut line)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_handler_unsubscribes_itself_during_dispatch() {
    let (addr, _hub) = start_hub(HubConfig::default()).await;
    let (session, _events) = ClientSession::new(SessionConfig::new(addr.to_string()));
    let session = Arc::new(session);

    let once_count = Arc::new(AtomicUsize::new(0));
    let all_count = Arc::new(AtomicUsize::new(0));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    // Handler id is known only after registration, so hand it to the
    // handler through a shared cell.
    let self_id = Arc::new(AtomicU64::new(0));
    let id = {
        let once_count = Arc::clone(&once_count);
        let self_id = Arc::clone(&self_id);
        let weak = Arc::downgrade(&session);
        session.on_message(move |_msg| {
            once_count.fetch_add(1, Ordering::SeqCst);
            if let Some(session) = weak.upgrade() {
                session.remove_handler(self_id.load(Ordering::SeqCst));
            }
        })
    };
    self_id.store(id, Ordering::SeqCst);

    {
        let all_count = Arc::clone(&all_count);
        session.on_message(move |msg| {
            all_count.fetch_add(1, Ordering::SeqCst);
            let _ = done_tx.send(msg.clone());
        });
    }

    session.connect().await.unwrap();
    session
        .send(Message::text("u1", "alice", "one", 1))
        .await
        .unwrap();
    timeout(WAIT, done_rx.recv()).await.unwrap().unwrap(); // welcome
    timeout(WAIT, done_rx.recv()).await.unwrap().unwrap(); // "one"
    session
        .send(Message::text("u1", "alice", "two", 2))
        .await
        .unwrap();
    timeout(WAIT, done_rx.recv()).await.unwrap().unwrap(); // "two"

    // The self-removing handler fired exactly once (for the welcome); the
    // surviving handler saw all three frames.
    assert_eq!(once_count.load(Ordering::SeqCst), 1);
    assert_eq!(all_count.load(Ordering::SeqCst), 3);
}

struct MockUploader;

#[async_trait::async_trait]
impl UploadService for MockUploader {
    async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<UploadedFile> {
        Ok(UploadedFile {
            success: true,
            file_url: format!("/uploads/{file_name}"),
            file_name: file_name.to_string(),
            file_size: data.len() as i64,
            mime_type: content_type.to_string(),
        })
    }
}

#[tokio::test]
async fn test_upload_then_attachment_broadcast() {
    let (addr, hub) = start_hub(HubConfig::default()).await;
    let (a, _a_events, _a_rx) = connected_session(addr).await;
    let (_b, _b_events, mut b_rx) = connected_session(addr).await;
    recv_message(&mut b_rx).await; // welcome

    a.send_file(
        &MockUploader,
        MessageKind::Video,
        "u1",
        "alice",
        "clip.mp4",
        "video/mp4",
        Bytes::from_static(b"not really a video"),
        9000,
    )
    .await
    .unwrap();

    let got = recv_message(&mut b_rx).await;
    assert_eq!(got.kind, MessageKind::Video);
    assert_eq!(
        got.attachment,
        Some(Attachment {
            url: "/uploads/clip.mp4".into(),
            name: "clip.mp4".into(),
            size_bytes: 18,
        })
    );
    assert!(got.content.is_none());
    assert_eq!(hub.store().count().unwrap(), 1);
}
