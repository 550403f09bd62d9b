//! Connection manager, the top-level state machine.
//!
//! A connect attempt walks the stages in order: resolve the hub
//! (`Rest`), register a participant (`Participant`), open the keepalive
//! socket (`WebSocket`) and wait for the first heartbeat (`Complete`).
//! Tearing down unwinds every stage reached, newest first.
//!
//! Every asynchronous completion carries the attempt number it was
//! started for and is dropped unless the machine is still at that attempt
//! and the stage it expects.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use hublink_protocol::Participant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::config::NetworkConfig;
use crate::connectivity::HubConnectivity;
use crate::error::ConnectionError;
use crate::events::{EventBus, HubEvent};
use crate::keepalive::KeepAlive;
use crate::observers::{ConnectionObserver, ObserverId, ObserverRegistry};
use crate::participants::{ParticipantRegistrar, Registration};
use crate::session::HubConnection;
use crate::types::{ConnectionManagerState, ConnectionState, LivenessEvent, Stage};

/// Teardown order: each stage releases what it acquired, newest first.
const TEARDOWN_ORDER: [Stage; 4] = [
    Stage::Complete,
    Stage::WebSocket,
    Stage::Participant,
    Stage::Rest,
];

enum Target {
    HubId(String),
    SecurityCode(String),
}

enum Next {
    Register(Option<Participant>),
    Stop,
}

enum Notification {
    State(ConnectionManagerState),
    Completed(Option<ConnectionError>),
}

struct Machine {
    state: ConnectionManagerState,
    attempt: u64,
    reconnect_participant: Option<Participant>,
    last_hub_id: Option<String>,
    setup_timeout: Option<AbortHandle>,
}

impl Machine {
    fn is_current(&self, attempt: u64, stage: Stage) -> bool {
        self.attempt == attempt && self.state == ConnectionManagerState::Connecting(stage)
    }

    fn cancel_timeout(&mut self) {
        if let Some(timeout) = self.setup_timeout.take() {
            timeout.abort();
        }
    }
}

struct Inner {
    connectivity: Arc<dyn HubConnectivity>,
    participants: Arc<dyn ParticipantRegistrar>,
    keepalive: Arc<dyn KeepAlive>,
    bus: EventBus,
    config: NetworkConfig,
    observers: ObserverRegistry,
    notify_tx: mpsc::UnboundedSender<Notification>,
    machine: Mutex<Machine>,
}

/// Drives a hub connection from discovery to a live keepalive session.
///
/// Cheap to clone; clones share the same state machine.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates the manager and starts its background tasks.
    ///
    /// `liveness_rx` must receive the events of `keepalive`. Must be
    /// called from within a Tokio runtime.
    pub fn new(
        connectivity: Arc<dyn HubConnectivity>,
        participants: Arc<dyn ParticipantRegistrar>,
        keepalive: Arc<dyn KeepAlive>,
        liveness_rx: mpsc::UnboundedReceiver<LivenessEvent>,
        bus: EventBus,
        config: NetworkConfig,
    ) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            connectivity,
            participants,
            keepalive,
            bus,
            config,
            observers: ObserverRegistry::default(),
            notify_tx,
            machine: Mutex::new(Machine {
                state: ConnectionManagerState::Unknown,
                attempt: 0,
                reconnect_participant: None,
                last_hub_id: None,
                setup_timeout: None,
            }),
        });

        tokio::spawn(dispatch_notifications(Arc::downgrade(&inner), notify_rx));
        tokio::spawn(pump_liveness(Arc::downgrade(&inner), liveness_rx));

        Self { inner }
    }

    /// Connects to a hub by its identifier.
    pub fn connect_to_hub(&self, hub_id: &str) {
        info!(hub = %hub_id, "connecting to hub");
        self.inner.start(Target::HubId(hub_id.to_string()));
    }

    /// Connects to a hub by its pairing code.
    pub fn connect_with_code(&self, security_code: &str) {
        info!("connecting to hub by security code");
        self.inner.start(Target::SecurityCode(security_code.to_string()));
    }

    /// Connects again to the last hub that was reached.
    ///
    /// Returns `false` when no hub is remembered.
    pub fn reconnect(&self) -> bool {
        let Some(hub_id) = self.inner.lock().last_hub_id.clone() else {
            debug!("no hub to reconnect to");
            return false;
        };
        self.connect_to_hub(&hub_id);
        true
    }

    /// Tears down the current session. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Hands a previously registered participant to the next attempt.
    pub fn resume_participant(&self, participant: Participant) {
        self.inner.lock().reconnect_participant = Some(participant);
    }

    /// Forgets the remembered hub.
    pub fn clear_hub_id(&self) {
        self.inner.lock().last_hub_id = None;
    }

    pub fn state(&self) -> ConnectionManagerState {
        self.inner.lock().state.clone()
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    /// The last hub reached.
    pub fn hub_id(&self) -> Option<String> {
        self.inner.lock().last_hub_id.clone()
    }

    /// Name of the hub the active session resolved.
    pub fn hub_name(&self) -> Option<String> {
        self.inner
            .connectivity
            .active_connection()
            .and_then(|c| c.hub_name())
    }

    /// Registers an observer. It is held weakly and dropped from the
    /// registry when its last strong reference goes away.
    pub fn add_observer(&self, observer: &Arc<dyn ConnectionObserver>) -> ObserverId {
        self.inner.observers.add(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) {
        self.inner.observers.remove(id);
    }

    /// Subscribes to the event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.bus.subscribe()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies a state change. Equal states are not re-announced.
    fn set_state(&self, machine: &mut Machine, state: ConnectionManagerState) {
        if machine.state == state {
            return;
        }
        debug!(from = ?machine.state, to = ?state, "connection manager state");
        machine.state = state.clone();
        let _ = self.notify_tx.send(Notification::State(state.clone()));
        self.bus.publish(HubEvent::StateChanged(state));
    }

    /// Announces the end of a connect attempt. Called with the machine
    /// locked so it is ordered with state changes.
    fn complete(&self, _machine: &Machine, error: Option<ConnectionError>) {
        let _ = self.notify_tx.send(Notification::Completed(error.clone()));
        self.bus.publish(HubEvent::ConnectAttemptCompleted(error));
    }

    fn start(self: &Arc<Self>, target: Target) {
        if self.lock().state.stage().is_some() {
            debug!("replacing current session");
            self.teardown(None);
        }

        let attempt = {
            let mut machine = self.lock();
            machine.attempt += 1;
            machine.cancel_timeout();
            self.set_state(&mut machine, ConnectionManagerState::Connecting(Stage::Rest));
            machine.attempt
        };

        let inner = self.clone();
        tokio::spawn(async move { inner.run_attempt(attempt, target).await });
    }

    async fn run_attempt(self: Arc<Self>, attempt: u64, target: Target) {
        let connection = match &target {
            Target::HubId(hub_id) => self.connectivity.connect_by_hub_id(hub_id, false).await,
            Target::SecurityCode(code) => {
                self.connectivity.connect_by_security_code(code, false).await
            }
        };

        let Next::Register(existing) = self.on_resolved(attempt, &connection) else {
            return;
        };
        let outcome = self.participants.register(existing).await;
        self.on_registered(attempt, outcome);
    }

    /// The resolved set only becomes active here, once the attempt is
    /// known to still be current.
    fn on_resolved(&self, attempt: u64, connection: &Arc<HubConnection>) -> Next {
        let resolved = connection.state();
        let mut machine = self.lock();
        if !machine.is_current(attempt, Stage::Rest) {
            debug!(attempt, "stale hub resolution ignored");
            return Next::Stop;
        }

        match resolved {
            ConnectionState::Connected(path) => {
                info!(hub = ?connection.hub_id(), %path, "hub resolved");
                self.connectivity.set_as_main(connection);
                self.set_state(
                    &mut machine,
                    ConnectionManagerState::Connecting(Stage::Participant),
                );
                Next::Register(machine.reconnect_participant.clone())
            }
            ConnectionState::Error(error) => {
                drop(machine);
                warn!(%error, "hub resolution failed");
                self.teardown(Some(error));
                Next::Stop
            }
            other => {
                drop(machine);
                self.teardown(Some(ConnectionError::UnexpectedState(format!(
                    "hub resolved while {other:?}"
                ))));
                Next::Stop
            }
        }
    }

    fn on_registered(
        self: &Arc<Self>,
        attempt: u64,
        outcome: Result<Registration, ConnectionError>,
    ) {
        let mut machine = self.lock();
        if !machine.is_current(attempt, Stage::Participant) {
            drop(machine);
            debug!(attempt, "stale registration ignored");
            if let Ok(Registration::Registered(participant)) = outcome {
                self.participants.discard(&participant);
            }
            return;
        }

        match outcome {
            Ok(Registration::Registered(participant)) => {
                self.set_state(
                    &mut machine,
                    ConnectionManagerState::Connecting(Stage::WebSocket),
                );
                self.arm_setup_timeout(&mut machine, attempt);
                drop(machine);

                self.keepalive.set_participant_id(&participant.id);
                self.keepalive.setup_connection();
            }
            Ok(Registration::Skipped) => {
                info!("no display name configured, waiting at participant stage");
            }
            Err(error) => {
                drop(machine);
                warn!(%error, "participant registration failed");
                self.teardown(Some(error));
            }
        }
    }

    fn arm_setup_timeout(self: &Arc<Self>, machine: &mut Machine, attempt: u64) {
        machine.cancel_timeout();
        let timeout = self.config.connection_timeout();
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_setup_timeout(attempt);
            }
        });
        machine.setup_timeout = Some(task.abort_handle());
    }

    fn on_setup_timeout(&self, attempt: u64) {
        {
            let mut machine = self.lock();
            if !machine.is_current(attempt, Stage::WebSocket) {
                return;
            }
            machine.setup_timeout = None;
        }
        warn!("connection setup timed out");
        self.teardown(Some(ConnectionError::ConnectionSetupTimeout));
    }

    fn on_liveness(&self, event: LivenessEvent) {
        let active = self.connectivity.active_connection();
        let mut machine = self.lock();
        let waiting = machine.state == ConnectionManagerState::Connecting(Stage::WebSocket);
        let connected = machine.state == ConnectionManagerState::Connected;

        match event {
            LivenessEvent::Up if waiting => {
                machine.cancel_timeout();
                self.set_state(&mut machine, ConnectionManagerState::Connected);
                machine.last_hub_id = active.as_ref().and_then(|c| c.hub_id());
                self.complete(&machine, None);
                drop(machine);

                info!(hub = ?active.as_ref().and_then(|c| c.hub_id()), "connected to hub");
                if let Some(hub_name) = active.and_then(|c| c.hub_name()) {
                    self.bus.publish(HubEvent::ConnectedToHub { hub_name });
                }
            }
            LivenessEvent::Up if connected => trace!("keepalive already up"),
            LivenessEvent::Up => {
                drop(machine);
                debug!("keepalive up outside a connect attempt, closing socket");
                self.keepalive.disconnect(None);
            }
            LivenessEvent::Down(_) if !waiting && !connected => {
                trace!("keepalive down ignored");
            }
            LivenessEvent::Down(Some(error)) => {
                drop(machine);
                warn!(%error, "keepalive lost");
                self.teardown(Some(error));
            }
            LivenessEvent::Down(None) => {
                drop(machine);
                info!("keepalive closed");
                self.disconnect();
            }
        }
    }

    fn disconnect(&self) {
        self.lock().reconnect_participant = None;
        self.teardown(None);
    }

    /// Unwinds every stage reached and settles in `Error` or
    /// `NotConnected`.
    fn teardown(&self, error: Option<ConnectionError>) {
        let settled = match &error {
            Some(error) => ConnectionManagerState::Error(error.clone()),
            None => ConnectionManagerState::NotConnected,
        };

        let (stage, attempt, was_connecting) = {
            let mut machine = self.lock();
            machine.attempt += 1;
            machine.cancel_timeout();
            let Some(stage) = machine.state.stage() else {
                self.set_state(&mut machine, settled);
                return;
            };
            let was_connecting = matches!(machine.state, ConnectionManagerState::Connecting(_));
            (stage, machine.attempt, was_connecting)
        };

        debug!(?stage, error = ?error, "tearing down");
        for step in TEARDOWN_ORDER.into_iter().filter(|step| *step <= stage) {
            self.teardown_step(step);
        }

        let mut machine = self.lock();
        if machine.attempt == attempt {
            self.set_state(&mut machine, settled);
        } else {
            debug!("new attempt started during teardown");
        }
        if was_connecting {
            self.complete(&machine, error);
        }
    }

    fn teardown_step(&self, stage: Stage) {
        trace!(?stage, "teardown step");
        match stage {
            Stage::Complete => self.keepalive.disconnect(None),
            Stage::WebSocket => self.participants.unregister(),
            Stage::Participant => self.connectivity.disconnect(),
            Stage::Rest => {}
        }
    }
}

/// Delivers observer notifications in the order they were queued.
async fn dispatch_notifications(
    inner: Weak<Inner>,
    mut notify_rx: mpsc::UnboundedReceiver<Notification>,
) {
    while let Some(notification) = notify_rx.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        for observer in inner.observers.snapshot() {
            match &notification {
                Notification::State(state) => observer.on_state_changed(state),
                Notification::Completed(error) => observer.on_connect_completed(error.as_ref()),
            }
        }
    }
}

async fn pump_liveness(
    inner: Weak<Inner>,
    mut liveness_rx: mpsc::UnboundedReceiver<LivenessEvent>,
) {
    while let Some(event) = liveness_rx.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        trace!(?event, "liveness event");
        inner.on_liveness(event);
    }
}
