//! Socket transport seam used by the keepalive supervisor.

use std::sync::Arc;

/// Receives socket lifecycle callbacks.
///
/// For every [`WebSocketTransport::connect`] the transport calls
/// `on_close` exactly once, after which no further callbacks arrive. A
/// failure is reported through `on_error` right before that `on_close`.
pub trait SocketDelegate: Send + Sync {
    fn on_open(&self);
    fn on_close(&self, code: u16, reason: &str);
    fn on_message(&self, text: &str);
    fn on_data(&self, data: &[u8]);
    fn on_error(&self, error: &str);
}

/// Errors sending on the socket.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("socket not connected")]
    NotConnected,

    #[error("send queue full")]
    QueueFull,
}

/// A persistent message socket.
pub trait WebSocketTransport: Send + Sync {
    /// Opens a socket to `url`, replacing any previous one.
    fn connect(&self, url: &str, delegate: Arc<dyn SocketDelegate>);

    /// Closes the current socket, if any.
    fn disconnect(&self);

    /// Queues a text frame.
    fn send(&self, text: String) -> Result<(), TransportError>;
}
