//! Keepalive socket writer.
//!
//! Frames queued by the transport go out in order. A failed write ends the
//! session: the pump cancels the shared token so the reader stops too, and
//! hands the error back for the close report.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Drains `queue` into `sink` until cancelled or the queue closes, then
/// sends a close frame. Returns the write error that ended the session.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Message>,
    session: CancellationToken,
) -> Option<String>
where
    S: SinkExt<Message, Error = WsError> + Unpin,
{
    let failure = loop {
        let frame = tokio::select! {
            _ = session.cancelled() => break None,
            frame = queue.recv() => frame,
        };
        let Some(frame) = frame else {
            debug!("send queue closed");
            break None;
        };
        if let Err(e) = sink.send(frame).await {
            warn!(error = %e, "keepalive socket write failed");
            session.cancel();
            break Some(e.to_string());
        }
    };

    if failure.is_none() {
        let _ = sink.send(Message::Close(None)).await;
    }
    failure
}
