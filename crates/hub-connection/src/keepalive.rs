//! Keepalive supervisor.
//!
//! Opens the keepalive socket of the active hub, sends a heartbeat with
//! the participant id every polling interval once the socket is open, and
//! reports liveness transitions. `Up` is emitted when heartbeating starts.
//! `Down` is emitted once per socket when it closes, carrying the error
//! that caused the close, if any.
//!
//! Every socket gets a generation number. Callbacks from an older
//! socket are dropped, so a replaced connection can never report on
//! behalf of the current one.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use hublink_hub_api::EndpointProvider;
use hublink_protocol::KeepAliveMessage;
use hublink_protocol::constants::MAX_KEEPALIVE_MESSAGE_SIZE;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::NetworkConfig;
use crate::error::ConnectionError;
use crate::events::{EventBus, HubEvent};
use crate::transport::{SocketDelegate, WebSocketTransport};
use crate::types::LivenessEvent;

const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// Socket liveness supervision, as driven by the connection manager.
pub trait KeepAlive: Send + Sync {
    /// Sets the participant reported in heartbeats.
    fn set_participant_id(&self, participant_id: &str);

    /// Opens the keepalive socket, replacing any current one.
    fn setup_connection(&self);

    /// Stops heartbeating without closing the socket.
    fn stop_polling(&self);

    /// Stops all timers and closes the socket. Idempotent.
    fn disconnect(&self, error: Option<ConnectionError>);
}

#[derive(Default)]
struct State {
    generation: u64,
    /// A socket was requested and has not reported its close yet.
    active: bool,
    /// We asked the transport to close the socket.
    closing: bool,
    /// The socket is open.
    armed: bool,
    polling: bool,
    participant_id: Option<String>,
    last_error: Option<ConnectionError>,
    heartbeat: Option<CancellationToken>,
    watchdog: Option<AbortHandle>,
}

impl State {
    fn cancel_timers(&mut self) {
        if let Some(token) = self.heartbeat.take() {
            token.cancel();
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
        self.polling = false;
    }
}

struct Inner {
    transport: Arc<dyn WebSocketTransport>,
    endpoints: Arc<dyn EndpointProvider>,
    polling_interval: Duration,
    response_timeout: Option<Duration>,
    liveness_tx: mpsc::UnboundedSender<LivenessEvent>,
    bus: EventBus,
    state: Mutex<State>,
}

/// Keepalive supervisor over a [`WebSocketTransport`].
///
/// Must be used from within a Tokio runtime.
pub struct KeepAliveService {
    inner: Arc<Inner>,
}

impl KeepAliveService {
    pub fn new(
        transport: Arc<dyn WebSocketTransport>,
        endpoints: Arc<dyn EndpointProvider>,
        config: &NetworkConfig,
        liveness_tx: mpsc::UnboundedSender<LivenessEvent>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                endpoints,
                polling_interval: config.polling_interval().max(MIN_POLLING_INTERVAL),
                response_timeout: config.response_timeout(),
                liveness_tx,
                bus,
                state: Mutex::new(State::default()),
            }),
        }
    }
}

impl KeepAlive for KeepAliveService {
    fn set_participant_id(&self, participant_id: &str) {
        self.inner.lock().participant_id = Some(participant_id.to_string());
        self.inner.maybe_start_polling();
    }

    fn setup_connection(&self) {
        let Some(url) = self.inner.endpoints.websocket_endpoint() else {
            warn!("no keepalive endpoint available");
            self.inner.emit(LivenessEvent::Down(Some(
                ConnectionError::KeepaliveTransportError("no keepalive endpoint".into()),
            )));
            return;
        };

        let (generation, replaced) = {
            let mut state = self.inner.lock();
            state.cancel_timers();
            state.generation += 1;
            let replaced = state.active;
            state.active = true;
            state.closing = false;
            state.armed = false;
            state.last_error = None;
            (state.generation, replaced)
        };
        if replaced {
            debug!("replacing keepalive socket");
            self.inner.transport.disconnect();
        }

        debug!(generation, "opening keepalive socket");
        let handler = Arc::new(SocketHandler {
            inner: Arc::downgrade(&self.inner),
            generation,
        });
        self.inner.transport.connect(&url, handler);
    }

    fn stop_polling(&self) {
        debug!("keepalive polling stopped");
        self.inner.lock().cancel_timers();
    }

    fn disconnect(&self, error: Option<ConnectionError>) {
        self.inner.disconnect(error);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock();
        state.active && state.generation == generation
    }

    fn emit(&self, event: LivenessEvent) {
        let _ = self.liveness_tx.send(event.clone());
        self.bus.publish(match event {
            LivenessEvent::Up => HubEvent::KeepAliveUp,
            LivenessEvent::Down(error) => HubEvent::KeepAliveDown(error),
        });
    }

    fn disconnect(&self, error: Option<ConnectionError>) {
        {
            let mut state = self.lock();
            state.cancel_timers();
            if !state.active || state.closing {
                return;
            }
            state.closing = true;
            if state.last_error.is_none() {
                state.last_error = error;
            }
        }
        debug!("closing keepalive socket");
        self.transport.disconnect();
    }

    fn maybe_start_polling(self: &Arc<Self>) {
        let generation = {
            let mut state = self.lock();
            if state.polling || state.closing || !state.armed || state.participant_id.is_none() {
                return;
            }
            state.polling = true;
            let token = CancellationToken::new();
            state.heartbeat = Some(token.clone());
            tokio::spawn(heartbeat_pump(
                Arc::downgrade(self),
                state.generation,
                self.polling_interval,
                token,
            ));
            state.generation
        };

        self.send_heartbeat(generation);
        info!("keepalive up");
        self.emit(LivenessEvent::Up);
    }

    /// Returns `false` once the socket this heartbeat belongs to is gone.
    fn send_heartbeat(self: &Arc<Self>, generation: u64) -> bool {
        let participant_id = {
            let state = self.lock();
            if state.generation != generation || state.closing || !state.armed {
                return false;
            }
            match &state.participant_id {
                Some(id) => id.clone(),
                None => return false,
            }
        };

        match KeepAliveMessage::keep_alive(participant_id).to_json() {
            Ok(json) => {
                trace!("sending heartbeat");
                if let Err(e) = self.transport.send(json) {
                    debug!("heartbeat not sent: {e}");
                }
            }
            Err(e) => warn!("failed to encode heartbeat: {e}"),
        }
        self.arm_watchdog(generation);
        true
    }

    fn arm_watchdog(self: &Arc<Self>, generation: u64) {
        let Some(timeout) = self.response_timeout else {
            return;
        };
        let mut state = self.lock();
        if state.generation != generation || state.watchdog.is_some() {
            return;
        }
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.watchdog_fired(generation);
            }
        });
        state.watchdog = Some(task.abort_handle());
    }

    fn watchdog_fired(&self, generation: u64) {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.watchdog = None;
        }
        warn!("keepalive response timed out");
        self.disconnect(Some(ConnectionError::KeepaliveResponseTimeout));
    }

    fn on_open(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.lock();
            if !state.active || state.generation != generation {
                return;
            }
            state.armed = true;
        }
        debug!(generation, "keepalive socket open");
        self.maybe_start_polling();
    }

    fn on_payload(&self, generation: u64, data: &[u8]) {
        {
            let mut state = self.lock();
            if !state.active || state.generation != generation {
                return;
            }
            if let Some(watchdog) = state.watchdog.take() {
                watchdog.abort();
            }
        }

        if data.len() > MAX_KEEPALIVE_MESSAGE_SIZE {
            debug!(len = data.len(), "oversized keepalive message ignored");
            return;
        }
        match KeepAliveMessage::from_slice(data) {
            Ok(KeepAliveMessage::KeepAlive(participant)) => {
                trace!(%participant, "keepalive acknowledged");
            }
            Ok(KeepAliveMessage::Error(message)) => {
                warn!(%message, "hub reported keepalive error");
                self.disconnect(Some(ConnectionError::KeepaliveServerError(message)));
            }
            Err(e) => debug!("ignoring keepalive payload: {e}"),
        }
    }

    fn on_error(&self, generation: u64, error: &str) {
        if !self.is_current(generation) {
            return;
        }
        warn!(%error, "keepalive socket error");
        self.disconnect(Some(ConnectionError::KeepaliveTransportError(
            error.to_string(),
        )));
    }

    fn on_close(&self, generation: u64, code: u16, reason: &str) {
        let error = {
            let mut state = self.lock();
            if !state.active || state.generation != generation {
                return;
            }
            state.cancel_timers();
            state.active = false;
            state.closing = false;
            state.armed = false;
            state.last_error.take()
        };
        info!(code, %reason, error = ?error, "keepalive down");
        self.emit(LivenessEvent::Down(error));
    }
}

/// Sends a heartbeat every `period` until cancelled. The first heartbeat
/// is sent by the caller.
async fn heartbeat_pump(
    inner: Weak<Inner>,
    generation: u64,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                if !inner.send_heartbeat(generation) {
                    break;
                }
            }
        }
    }
}

/// Socket delegate bound to one socket generation.
struct SocketHandler {
    inner: Weak<Inner>,
    generation: u64,
}

impl SocketDelegate for SocketHandler {
    fn on_open(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_open(self.generation);
        }
    }

    fn on_close(&self, code: u16, reason: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_close(self.generation, code, reason);
        }
    }

    fn on_message(&self, text: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_payload(self.generation, text.as_bytes());
        }
    }

    fn on_data(&self, data: &[u8]) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_payload(self.generation, data);
        }
    }

    fn on_error(&self, error: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_error(self.generation, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hublink_hub_api::ApiError;

    use crate::transport::TransportError;

    #[derive(Default)]
    struct MockTransport {
        connects: Mutex<Vec<(String, Arc<dyn SocketDelegate>)>>,
        sent: Mutex<Vec<String>>,
        disconnects: AtomicUsize,
    }

    impl MockTransport {
        fn delegate(&self, index: usize) -> Arc<dyn SocketDelegate> {
            self.connects.lock().unwrap()[index].1.clone()
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl WebSocketTransport for MockTransport {
        fn connect(&self, url: &str, delegate: Arc<dyn SocketDelegate>) {
            self.connects
                .lock()
                .unwrap()
                .push((url.to_string(), delegate));
        }

        fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        fn send(&self, text: String) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
    }

    struct FixedEndpoint(Option<String>);

    impl EndpointProvider for FixedEndpoint {
        fn endpoint_base_path(&self) -> Option<String> {
            None
        }

        fn websocket_endpoint(&self) -> Option<String> {
            self.0.clone()
        }

        fn should_retry(&self, _endpoint: &str, _error: &ApiError) -> bool {
            false
        }
    }

    const URL: &str = "ws://10.0.0.7:8080/keepalive?token=t";

    fn service(
        endpoint: Option<&str>,
        response_timeout_secs: u64,
    ) -> (
        KeepAliveService,
        Arc<MockTransport>,
        mpsc::UnboundedReceiver<LivenessEvent>,
    ) {
        let transport = Arc::new(MockTransport::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let config = NetworkConfig {
            response_timeout_secs,
            ..NetworkConfig::default()
        };
        let svc = KeepAliveService::new(
            transport.clone(),
            Arc::new(FixedEndpoint(endpoint.map(Into::into))),
            &config,
            tx,
            EventBus::new(),
        );
        (svc, transport, rx)
    }

    fn heartbeat(id: &str) -> String {
        KeepAliveMessage::keep_alive(id).to_json().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_eagerly_then_every_interval() {
        let (svc, transport, mut rx) = service(Some(URL), 0);
        svc.set_participant_id("p1");
        svc.setup_connection();
        assert_eq!(transport.connects.lock().unwrap()[0].0, URL);
        assert!(transport.sent().is_empty());

        transport.delegate(0).on_open();
        assert_eq!(transport.sent(), [heartbeat("p1")]);
        assert_eq!(rx.try_recv().unwrap(), LivenessEvent::Up);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(transport.sent().len(), 2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.sent().len(), 3);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn participant_after_open_starts_polling() {
        let (svc, transport, mut rx) = service(Some(URL), 0);
        svc.setup_connection();
        transport.delegate(0).on_open();
        assert!(transport.sent().is_empty());
        assert!(rx.try_recv().is_err());

        svc.set_participant_id("p1");
        assert_eq!(transport.sent(), [heartbeat("p1")]);
        assert_eq!(rx.try_recv().unwrap(), LivenessEvent::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_polling_keeps_socket_open() {
        let (svc, transport, _rx) = service(Some(URL), 0);
        svc.set_participant_id("p1");
        svc.setup_connection();
        transport.delegate(0).on_open();

        svc.stop_polling();
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_endpoint_is_down_with_error() {
        let (svc, transport, mut rx) = service(None, 0);
        svc.setup_connection();
        assert!(transport.connects.lock().unwrap().is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            LivenessEvent::Down(Some(ConnectionError::KeepaliveTransportError(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hub_error_message_closes_with_server_error() {
        let (svc, transport, mut rx) = service(Some(URL), 0);
        svc.set_participant_id("p1");
        svc.setup_connection();
        let socket = transport.delegate(0);
        socket.on_open();
        assert_eq!(rx.try_recv().unwrap(), LivenessEvent::Up);

        socket.on_message(r#"{"messageType":"error","data":"participant unknown"}"#);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);

        // Heartbeats stopped with the disconnect.
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(transport.sent().len(), 1);

        socket.on_close(1000, "closed by client");
        assert_eq!(
            rx.try_recv().unwrap(),
            LivenessEvent::Down(Some(ConnectionError::KeepaliveServerError(
                "participant unknown".into()
            )))
        );
    }

    #[tokio::test]
    async fn unparseable_payloads_are_ignored() {
        let (svc, transport, mut rx) = service(Some(URL), 0);
        svc.set_participant_id("p1");
        svc.setup_connection();
        let socket = transport.delegate(0);
        socket.on_open();
        rx.try_recv().unwrap();

        socket.on_message("not json");
        socket.on_message(r#"{"messageType":"shutdown","data":"x"}"#);
        socket.on_data(&vec![b' '; MAX_KEEPALIVE_MESSAGE_SIZE + 1]);
        socket.on_message(&heartbeat("p1"));

        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_hub_trips_response_watchdog() {
        let (svc, transport, mut rx) = service(Some(URL), 2);
        svc.set_participant_id("p1");
        svc.setup_connection();
        let socket = transport.delegate(0);
        socket.on_open();
        rx.try_recv().unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);

        socket.on_close(1000, "closed by client");
        assert_eq!(
            rx.try_recv().unwrap(),
            LivenessEvent::Down(Some(ConnectionError::KeepaliveResponseTimeout))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn replies_keep_the_watchdog_quiet() {
        let (svc, transport, _rx) = service(Some(URL), 2);
        svc.set_participant_id("p1");
        svc.setup_connection();
        let socket = transport.delegate(0);
        socket.on_open();

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            socket.on_message(&heartbeat("p1"));
            tokio::time::sleep(Duration::from_secs(4)).await;
        }
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 0);
        assert!(transport.sent().len() >= 3);
    }

    #[tokio::test]
    async fn transport_error_then_close_is_down_with_error() {
        let (svc, transport, mut rx) = service(Some(URL), 0);
        svc.setup_connection();
        let socket = transport.delegate(0);

        socket.on_error("connection refused");
        socket.on_close(1006, "");
        assert_eq!(
            rx.try_recv().unwrap(),
            LivenessEvent::Down(Some(ConnectionError::KeepaliveTransportError(
                "connection refused".into()
            )))
        );
    }

    #[tokio::test]
    async fn clean_close_is_down_without_error() {
        let (svc, transport, mut rx) = service(Some(URL), 0);
        svc.set_participant_id("p1");
        svc.setup_connection();
        let socket = transport.delegate(0);
        socket.on_open();
        rx.try_recv().unwrap();

        socket.on_close(1000, "bye");
        assert_eq!(rx.try_recv().unwrap(), LivenessEvent::Down(None));

        // A second close from the same socket is not reported again.
        socket.on_close(1000, "bye");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (svc, transport, mut rx) = service(Some(URL), 0);
        svc.disconnect(None);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 0);

        svc.setup_connection();
        svc.disconnect(None);
        svc.disconnect(Some(ConnectionError::AllPathsFailed));
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);

        transport.delegate(0).on_close(1000, "closed by client");
        assert_eq!(rx.try_recv().unwrap(), LivenessEvent::Down(None));
    }

    #[tokio::test]
    async fn stale_socket_callbacks_are_ignored() {
        let (svc, transport, mut rx) = service(Some(URL), 0);
        svc.set_participant_id("p1");
        svc.setup_connection();
        let first = transport.delegate(0);
        svc.setup_connection();
        let second = transport.delegate(1);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);

        first.on_open();
        first.on_error("late");
        first.on_close(1006, "");
        assert!(rx.try_recv().is_err());
        assert!(transport.sent().is_empty());

        second.on_open();
        assert_eq!(rx.try_recv().unwrap(), LivenessEvent::Up);
    }

    #[tokio::test]
    async fn publishes_liveness_on_the_bus() {
        let transport = Arc::new(MockTransport::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let svc = KeepAliveService::new(
            transport.clone(),
            Arc::new(FixedEndpoint(Some(URL.into()))),
            &NetworkConfig::default(),
            tx,
            bus,
        );
        svc.set_participant_id("p1");
        svc.setup_connection();
        transport.delegate(0).on_open();
        transport.delegate(0).on_close(1000, "");

        assert_eq!(events.recv().await.unwrap(), HubEvent::KeepAliveUp);
        assert_eq!(events.recv().await.unwrap(), HubEvent::KeepAliveDown(None));
    }
}
