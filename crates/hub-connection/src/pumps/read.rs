//! WebSocket read pump, forwards inbound frames to the socket delegate.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::transport::SocketDelegate;

/// Close code reported when the socket drops without a close handshake.
pub(crate) const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when we closed the socket ourselves.
pub(crate) const NORMAL_CLOSURE: u16 = 1000;

/// How the read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PumpExit {
    pub code: u16,
    pub reason: String,
    pub error: Option<String>,
}

impl PumpExit {
    pub(crate) fn failed(error: impl Into<String>) -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Reads frames until the peer closes, the stream fails or `cancel` fires.
pub(crate) async fn read_pump<S>(
    mut read: S,
    delegate: &dyn SocketDelegate,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) -> PumpExit
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return PumpExit {
                    code: NORMAL_CLOSURE,
                    reason: "closed by client".into(),
                    error: None,
                };
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        delegate.on_message(text.as_str());
                    }
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        delegate.on_data(&data);
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => {
                        trace!("received pong");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                            .unwrap_or((NORMAL_CLOSURE, String::new()));
                        debug!(code, %reason, "received close frame");
                        return PumpExit { code, reason, error: None };
                    }
                    Some(Ok(tungstenite::Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        return PumpExit::failed(e.to_string());
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return PumpExit::failed("connection lost");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures_util::stream;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[derive(Default)]
    struct Recorder {
        texts: Mutex<Vec<String>>,
        binary: Mutex<Vec<Vec<u8>>>,
    }

    impl SocketDelegate for Recorder {
        fn on_open(&self) {}
        fn on_close(&self, _code: u16, _reason: &str) {}
        fn on_message(&self, text: &str) {
            self.texts.lock().unwrap().push(text.to_string());
        }
        fn on_data(&self, data: &[u8]) {
            self.binary.lock().unwrap().push(data.to_vec());
        }
        fn on_error(&self, _error: &str) {}
    }

    type Frame = Result<tungstenite::Message, tungstenite::Error>;

    #[tokio::test]
    async fn dispatches_text_and_binary() {
        let frames: Vec<Frame> = vec![
            Ok(tungstenite::Message::Text("hello".into())),
            Ok(tungstenite::Message::Binary(vec![1, 2, 3].into())),
        ];
        let delegate = Recorder::default();
        let (write_tx, _write_rx) = mpsc::channel(16);

        let exit = read_pump(
            stream::iter(frames),
            &delegate,
            write_tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(delegate.texts.lock().unwrap().as_slice(), ["hello"]);
        assert_eq!(delegate.binary.lock().unwrap().as_slice(), [vec![1, 2, 3]]);
        assert_eq!(exit.code, ABNORMAL_CLOSURE);
        assert_eq!(exit.error.as_deref(), Some("connection lost"));
    }

    #[tokio::test]
    async fn answers_ping_with_pong() {
        let frames: Vec<Frame> = vec![Ok(tungstenite::Message::Ping(vec![7].into()))];
        let delegate = Recorder::default();
        let (write_tx, mut write_rx) = mpsc::channel(16);

        read_pump(
            stream::iter(frames),
            &delegate,
            write_tx,
            CancellationToken::new(),
        )
        .await;

        let pong = write_rx.recv().await.unwrap();
        assert!(matches!(pong, tungstenite::Message::Pong(ref d) if d[..] == [7]));
    }

    #[tokio::test]
    async fn close_frame_reports_code_and_reason() {
        let frames: Vec<Frame> = vec![
            Ok(tungstenite::Message::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "restarting".into(),
            }))),
            Ok(tungstenite::Message::Text("after close".into())),
        ];
        let delegate = Recorder::default();
        let (write_tx, _write_rx) = mpsc::channel(16);

        let exit = read_pump(
            stream::iter(frames),
            &delegate,
            write_tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(exit.code, 1001);
        assert_eq!(exit.reason, "restarting");
        assert!(exit.error.is_none());
        assert!(delegate.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_is_a_clean_close() {
        let delegate = Recorder::default();
        let (write_tx, _write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let exit = read_pump(stream::pending::<Frame>(), &delegate, write_tx, cancel).await;
        assert_eq!(exit.code, NORMAL_CLOSURE);
        assert!(exit.error.is_none());
    }
}
