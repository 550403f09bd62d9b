//! tokio-tungstenite implementation of [`WebSocketTransport`].
//!
//! Each `connect` spawns a session task that owns the socket. The task
//! splits the stream into a write pump fed over an mpsc queue and a read
//! pump that forwards frames to the delegate. A failed write closes the
//! session as abnormal. The close is reported once both pumps are done.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hublink_protocol::constants::MAX_KEEPALIVE_MESSAGE_SIZE;

use crate::pumps::read::{ABNORMAL_CLOSURE, NORMAL_CLOSURE, PumpExit, read_pump};
use crate::pumps::write::write_pump;
use crate::transport::{SocketDelegate, TransportError, WebSocketTransport};

const WRITE_QUEUE_DEPTH: usize = 64;

struct Session {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
}

/// WebSocket transport over tokio-tungstenite.
///
/// Must be used from within a Tokio runtime.
#[derive(Default)]
pub struct WsTransport {
    session: Mutex<Option<Session>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WebSocketTransport for WsTransport {
    fn connect(&self, url: &str, delegate: Arc<dyn SocketDelegate>) {
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        let previous = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Session {
                write_tx: write_tx.clone(),
                cancel: cancel.clone(),
            });
        if let Some(old) = previous {
            old.cancel.cancel();
        }

        tokio::spawn(run_session(
            url.to_string(),
            delegate,
            write_tx,
            write_rx,
            cancel,
        ));
    }

    fn disconnect(&self) {
        if let Some(session) = self.session.lock().unwrap_or_else(|e| e.into_inner()).take() {
            session.cancel.cancel();
        }
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        let guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let session = guard.as_ref().ok_or(TransportError::NotConnected)?;
        session
            .write_tx
            .try_send(tungstenite::Message::Text(text.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => TransportError::NotConnected,
            })
    }
}

async fn run_session(
    url: String,
    delegate: Arc<dyn SocketDelegate>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(MAX_KEEPALIVE_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(MAX_KEEPALIVE_MESSAGE_SIZE);

    debug!(%url, "opening socket");
    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        result = tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false) => Some(result),
    };

    let ws_stream = match connected {
        Some(Ok((stream, _))) => stream,
        Some(Err(e)) => {
            warn!(%url, "socket connect failed: {e}");
            delegate.on_error(&e.to_string());
            delegate.on_close(ABNORMAL_CLOSURE, "");
            return;
        }
        None => {
            debug!(%url, "connect cancelled");
            delegate.on_close(NORMAL_CLOSURE, "closed by client");
            return;
        }
    };

    info!(%url, "socket open");
    delegate.on_open();

    let (write, read) = ws_stream.split();
    let writer = tokio::spawn(write_pump(write, write_rx, cancel.clone()));

    let mut exit: PumpExit = read_pump(read, delegate.as_ref(), write_tx, cancel.clone()).await;

    cancel.cancel();
    if let Ok(Some(error)) = writer.await {
        if exit.error.is_none() {
            exit = PumpExit::failed(error);
        }
    }

    info!(code = exit.code, reason = %exit.reason, "socket closed");
    if let Some(error) = &exit.error {
        delegate.on_error(error);
    }
    delegate.on_close(exit.code, &exit.reason);
}
