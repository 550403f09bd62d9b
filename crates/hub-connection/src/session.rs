//! Session path set: which transport paths currently reach one hub.
//!
//! One [`HubConnection`] exists per discovery attempt. The local and cloud
//! discovery legs report into it concurrently; every mutation goes through a
//! single mutex, and the aggregated [`ConnectionState`] is derived from the
//! available paths by a fixed preference (local over cloud).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use hublink_hub_api::ApiError;
use hublink_hub_api::client::encode_segment;
use hublink_protocol::HubConfiguration;
use hublink_protocol::constants::ROUTE_HUBS;
use tracing::debug;

use crate::error::{ConnectionError, DiscoveryFailure};
use crate::events::{EventBus, HubEvent};
use crate::types::{ConnectionState, ConnectionType};

/// Which lookup a discovery failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    HubId,
    SecurityCode,
}

struct PathSet {
    hub_id: Option<String>,
    available: BTreeSet<ConnectionType>,
    attempted: BTreeSet<ConnectionType>,
    configurations: BTreeMap<ConnectionType, HubConfiguration>,
    errors: BTreeMap<ConnectionType, ConnectionError>,
    state: ConnectionState,
}

impl PathSet {
    fn best_available(&self) -> Option<ConnectionType> {
        self.available.first().copied()
    }

    fn connected_path(&self) -> Option<ConnectionType> {
        match self.state {
            ConnectionState::Connected(path) => Some(path),
            _ => None,
        }
    }
}

/// The set of viable paths to one hub.
pub struct HubConnection {
    base_path: String,
    bus: EventBus,
    inner: Mutex<PathSet>,
}

impl HubConnection {
    /// Creates an empty set. `base_path` is the cloud REST base used to
    /// build tunnel addresses.
    pub fn new(base_path: impl Into<String>, bus: EventBus) -> Self {
        Self {
            base_path: base_path.into(),
            bus,
            inner: Mutex::new(PathSet {
                hub_id: None,
                available: BTreeSet::new(),
                attempted: BTreeSet::new(),
                configurations: BTreeMap::new(),
                errors: BTreeMap::new(),
                state: ConnectionState::NotConnected,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PathSet> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resets every path for a new attempt at `hub_id`.
    pub fn start_discovery(&self, hub_id: &str) {
        let mut set = self.lock();
        set.hub_id = Some(hub_id.to_string());
        set.available.clear();
        set.attempted.clear();
        set.configurations.clear();
        set.errors.clear();
        self.set_state(&mut set, ConnectionState::Connecting);
    }

    /// Marks `path` as being tried, so its failure counts toward exhaustion.
    pub fn begin_path(&self, path: ConnectionType) {
        self.lock().attempted.insert(path);
    }

    /// Records a successful configuration fetch over `path`.
    pub fn add_available_path(&self, path: ConnectionType, config: HubConfiguration) {
        let mut set = self.lock();
        set.attempted.insert(path);
        set.errors.remove(&path);
        set.available.insert(path);
        set.configurations.insert(path, config);
        let best = set.best_available().unwrap_or(path);
        self.set_state(&mut set, ConnectionState::Connected(best));
    }

    /// Records a failed attempt over `path`.
    ///
    /// Once every attempted path has failed and none is available, the set
    /// settles in `Error(error)`.
    pub fn record_path_failure(&self, path: ConnectionType, error: ConnectionError) {
        let mut set = self.lock();
        debug!(path = %path, error = %error, "path failed");
        set.attempted.insert(path);
        set.available.remove(&path);
        set.configurations.remove(&path);
        set.errors.insert(path, error.clone());

        if set.connected_path() == Some(path) {
            let next = match set.best_available() {
                Some(best) => ConnectionState::Connected(best),
                None => ConnectionState::Connecting,
            };
            self.set_state(&mut set, next);
        }

        let exhausted = set.available.is_empty()
            && set.attempted.iter().all(|p| set.errors.contains_key(p));
        if exhausted {
            self.set_state(&mut set, ConnectionState::Error(error));
        }
    }

    /// Drops a path that proved unreachable mid-session, demoting to the
    /// next best one.
    pub fn remove_path(&self, path: ConnectionType) {
        let mut set = self.lock();
        set.available.remove(&path);
        set.configurations.remove(&path);
        if set.connected_path() != Some(path) {
            return;
        }
        match set.best_available() {
            Some(best) => self.set_state(&mut set, ConnectionState::Connected(best)),
            None => {
                self.set_state(&mut set, ConnectionState::NotConnected);
                self.bus
                    .publish(HubEvent::ConnectionError(ConnectionError::AllPathsFailed));
            }
        }
    }

    /// Settles the set in an error after the hub lookup itself failed.
    pub(crate) fn discovery_failed(&self, error: &ApiError, lookup: Lookup) {
        let reason = match (error.status(), lookup) {
            (Some(404), _) => DiscoveryFailure::HubNotFound,
            (_, Lookup::HubId) => DiscoveryFailure::InvalidHubId,
            (_, Lookup::SecurityCode) => DiscoveryFailure::InvalidSecurityCode,
        };
        let mut set = self.lock();
        self.set_state(
            &mut set,
            ConnectionState::Error(ConnectionError::DiscoveryFailed {
                reason,
                message: error.to_string(),
            }),
        );
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state.clone()
    }

    pub fn hub_id(&self) -> Option<String> {
        self.lock().hub_id.clone()
    }

    pub fn available_paths(&self) -> BTreeSet<ConnectionType> {
        self.lock().available.clone()
    }

    pub fn best_available_path(&self) -> Option<ConnectionType> {
        self.lock().best_available()
    }

    /// Last failure recorded for `path`.
    pub fn path_error(&self, path: ConnectionType) -> Option<ConnectionError> {
        self.lock().errors.get(&path).cloned()
    }

    /// Configuration of the connected path.
    pub fn config(&self) -> Option<HubConfiguration> {
        let set = self.lock();
        let path = set.connected_path()?;
        set.configurations.get(&path).cloned()
    }

    pub fn hub_name(&self) -> Option<String> {
        self.config().map(|c| c.hub_name)
    }

    /// REST base address of the connected path.
    pub fn endpoint_address(&self) -> Option<String> {
        let set = self.lock();
        let path = set.connected_path()?;
        self.endpoint_for(&set, path)
    }

    /// Keepalive socket address of the connected path, without credentials.
    pub fn keepalive_address(&self) -> Option<String> {
        self.config().map(|c| c.keep_alive_address)
    }

    /// Presenting socket address of the connected path, without credentials.
    pub fn presenting_address(&self) -> Option<String> {
        self.config().map(|c| c.presenting_address)
    }

    /// REST base address for `path`, if it can be derived.
    pub fn resolve_endpoint(&self, path: ConnectionType) -> Option<String> {
        let set = self.lock();
        self.endpoint_for(&set, path)
    }

    /// The available path whose base address is `endpoint`, if any.
    pub fn is_serving(&self, endpoint: &str) -> Option<ConnectionType> {
        let set = self.lock();
        set.available
            .iter()
            .copied()
            .find(|path| self.endpoint_for(&set, *path).as_deref() == Some(endpoint))
    }

    fn endpoint_for(&self, set: &PathSet, path: ConnectionType) -> Option<String> {
        match path {
            ConnectionType::Local => set.configurations.get(&path).map(|c| c.hub_address()),
            ConnectionType::Cloud => set.hub_id.as_ref().map(|id| {
                format!("{}{ROUTE_HUBS}{}/", self.base_path, encode_segment(id))
            }),
        }
    }

    fn set_state(&self, set: &mut PathSet, state: ConnectionState) {
        let old = std::mem::replace(&mut set.state, state.clone());
        debug!(hub = ?set.hub_id, from = ?old, to = ?state, "hub connection state");
        match state {
            ConnectionState::Connecting => self.bus.publish(HubEvent::ConnectionInProgress),
            ConnectionState::Error(error) => self.bus.publish(HubEvent::ConnectionError(error)),
            ConnectionState::Connected(path) if old != ConnectionState::Connected(path) => {
                self.bus.publish(HubEvent::ConnectionEstablished { path });
            }
            _ => {}
        }
    }
}
