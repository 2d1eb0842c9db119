//! Client-side socket writer task

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Depth of the session's outbound queue
pub(super) const CLIENT_SEND_QUEUE_DEPTH: usize = 64;

/// Drain outbound frames onto the socket until cancelled or the write fails
///
/// A write failure just ends the task; the read side observes the broken
/// connection and the session's reconnect loop takes over.
pub(super) async fn client_writer_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<String>,
    token: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = outbound.recv() => frame,
        };
        let Some(line) = frame else { break };

        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = write.await {
            tracing::debug!(error = %e, "write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
