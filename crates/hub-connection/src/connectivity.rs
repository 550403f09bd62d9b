//! Connectivity resolver.
//!
//! Discovers a hub's configuration through the cloud service and, in
//! parallel, directly on the LAN. Each attempt fills a [`HubConnection`];
//! one of them is designated active and answers endpoint queries and the
//! retry policy of hub-relative REST requests.

use std::sync::{Arc, RwLock};

use hublink_hub_api::client::encode_segment;
use hublink_hub_api::{
    ApiError, EndpointProvider, HubConfigurationApi, HubInfoApi, TokenProvider,
};
use hublink_protocol::HubConfiguration;
use hublink_protocol::constants::TOKEN_QUERY_KEY;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::config::NetworkConfig;
use crate::error::ConnectionError;
use crate::events::{EventBus, HubEvent};
use crate::reachability::Reachability;
use crate::session::{HubConnection, Lookup};
use crate::types::ConnectionType;

/// Resolves hubs to session path sets and tracks the active one.
pub trait HubConnectivity: Send + Sync {
    /// Discovers a hub by its identifier.
    ///
    /// Resolves as soon as the cloud lookup answers; a local lookup started
    /// afterwards only updates the returned set. With `as_main` the set
    /// becomes active once the cloud path is available.
    fn connect_by_hub_id(&self, hub_id: &str, as_main: bool) -> BoxFuture<'_, Arc<HubConnection>>;

    /// Discovers a hub by pairing code, racing the local and cloud paths.
    ///
    /// Resolves on the first path to connect, or after every path has
    /// answered. With `as_main` the first path to connect also makes the
    /// set active.
    fn connect_by_security_code(
        &self,
        security_code: &str,
        as_main: bool,
    ) -> BoxFuture<'_, Arc<HubConnection>>;

    /// Makes `connection` the set that answers endpoint queries.
    fn set_as_main(&self, connection: &Arc<HubConnection>);

    /// Forgets the active set.
    fn disconnect(&self);

    fn active_connection(&self) -> Option<Arc<HubConnection>>;
}

/// Resolver backed by the cloud hub-info API and the hub's own API.
pub struct HubConnectivityService {
    cloud: Arc<dyn HubInfoApi>,
    hub_api: Arc<dyn HubConfigurationApi>,
    tokens: Option<Arc<dyn TokenProvider>>,
    reachability: Arc<dyn Reachability>,
    bus: EventBus,
    config: NetworkConfig,
    active: RwLock<Option<Arc<HubConnection>>>,
}

impl HubConnectivityService {
    /// `hub_api` is only asked with explicit endpoints.
    pub fn new(
        cloud: Arc<dyn HubInfoApi>,
        hub_api: Arc<dyn HubConfigurationApi>,
        tokens: Option<Arc<dyn TokenProvider>>,
        reachability: Arc<dyn Reachability>,
        bus: EventBus,
        config: NetworkConfig,
    ) -> Self {
        Self {
            cloud,
            hub_api,
            tokens,
            reachability,
            bus,
            config,
            active: RwLock::new(None),
        }
    }

    /// Presenting socket address of the active set, with credentials.
    pub fn presenting_endpoint(&self) -> Option<String> {
        let address = self.active_connection()?.presenting_address()?;
        Some(self.with_token(address))
    }

    fn with_token(&self, address: String) -> String {
        match self.tokens.as_ref().and_then(|t| t.token()) {
            Some(token) => {
                let sep = if address.contains('?') { '&' } else { '?' };
                format!("{address}{sep}{TOKEN_QUERY_KEY}={}", encode_segment(&token))
            }
            None => address,
        }
    }

    fn new_connection(&self) -> Arc<HubConnection> {
        Arc::new(HubConnection::new(
            self.config.base_path.clone(),
            self.bus.clone(),
        ))
    }

    fn spawn_local_leg(
        &self,
        connection: Arc<HubConnection>,
        address: String,
        done: Option<mpsc::Sender<ConnectionType>>,
    ) {
        let api = self.hub_api.clone();
        tokio::spawn(async move {
            debug!(address = %address, "fetching configuration locally");
            let result = api.get_configuration(Some(&address)).await;
            record_leg(&connection, ConnectionType::Local, result);
            if let Some(done) = done {
                let _ = done.send(ConnectionType::Local).await;
            }
        });
    }

    fn spawn_cloud_leg(
        &self,
        connection: Arc<HubConnection>,
        hub_id: String,
        done: mpsc::Sender<ConnectionType>,
    ) {
        let api = self.cloud.clone();
        tokio::spawn(async move {
            debug!(hub = %hub_id, "fetching configuration via cloud");
            let result = api.get_configuration(&hub_id).await;
            record_leg(&connection, ConnectionType::Cloud, result);
            let _ = done.send(ConnectionType::Cloud).await;
        });
    }
}

fn record_leg(
    connection: &HubConnection,
    path: ConnectionType,
    result: Result<HubConfiguration, ApiError>,
) {
    match result {
        Ok(config) => {
            debug!(path = %path, hub_name = %config.hub_name, "path available");
            connection.add_available_path(path, config);
        }
        Err(e) => {
            warn!(path = %path, error = %e, "path connect failed");
            connection.record_path_failure(path, ConnectionError::path_failed(path, &e));
        }
    }
}

impl HubConnectivity for HubConnectivityService {
    fn connect_by_hub_id(&self, hub_id: &str, as_main: bool) -> BoxFuture<'_, Arc<HubConnection>> {
        let hub_id = hub_id.to_string();
        Box::pin(async move {
            let connection = self
                .active_connection()
                .filter(|c| c.hub_id().as_deref() == Some(hub_id.as_str()))
                .unwrap_or_else(|| self.new_connection());
            connection.start_discovery(&hub_id);
            connection.begin_path(ConnectionType::Cloud);

            match self.cloud.get_configuration(&hub_id).await {
                Ok(config) => {
                    let local_address = config.hub_address();
                    connection.add_available_path(ConnectionType::Cloud, config);
                    if as_main {
                        self.set_as_main(&connection);
                    }
                    if self.reachability.is_reachable_on_lan() {
                        connection.begin_path(ConnectionType::Local);
                        self.spawn_local_leg(connection.clone(), local_address, None);
                    }
                }
                Err(e) => {
                    warn!(hub = %hub_id, error = %e, "hub lookup failed");
                    connection.discovery_failed(&e, Lookup::HubId);
                }
            }
            connection
        })
    }

    fn connect_by_security_code(
        &self,
        security_code: &str,
        as_main: bool,
    ) -> BoxFuture<'_, Arc<HubConnection>> {
        let code = security_code.to_string();
        Box::pin(async move {
            let connection = self.new_connection();
            let info = match self.cloud.get_info(&code).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(error = %e, "pairing code lookup failed");
                    connection.discovery_failed(&e, Lookup::SecurityCode);
                    return connection;
                }
            };
            info!(hub = %info.hub_id, hub_ip = %info.hub_ip, "pairing code resolved");
            connection.start_discovery(&info.hub_id);

            // Every leg is marked before any is spawned, so an early failure
            // never sees a single attempted path.
            let local = self.reachability.is_reachable_on_lan();
            if local {
                connection.begin_path(ConnectionType::Local);
            }
            connection.begin_path(ConnectionType::Cloud);

            let (done_tx, mut done_rx) = mpsc::channel(ConnectionType::ALL.len());
            let mut legs = 0;
            if local {
                let address = info.local_address(self.config.local_api_port);
                self.spawn_local_leg(connection.clone(), address, Some(done_tx.clone()));
                legs += 1;
            }
            self.spawn_cloud_leg(connection.clone(), info.hub_id.clone(), done_tx);
            legs += 1;

            for _ in 0..legs {
                let Some(path) = done_rx.recv().await else {
                    break;
                };
                if connection.state().is_connected() {
                    debug!(first = %path, "discovery race won");
                    if as_main {
                        self.set_as_main(&connection);
                    }
                    return connection;
                }
            }
            connection
        })
    }

    fn set_as_main(&self, connection: &Arc<HubConnection>) {
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(connection.clone());
        let hub_id = connection.hub_id();
        info!(hub = ?hub_id, state = ?connection.state(), "active hub connection resolved");
        self.bus.publish(HubEvent::ActiveConnectionResolved { hub_id });
    }

    fn disconnect(&self) {
        if let Some(connection) = self.active.write().unwrap_or_else(|e| e.into_inner()).take() {
            debug!(hub = ?connection.hub_id(), "active hub connection dropped");
        }
    }

    fn active_connection(&self) -> Option<Arc<HubConnection>> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EndpointProvider for HubConnectivityService {
    fn endpoint_base_path(&self) -> Option<String> {
        self.active_connection()?.endpoint_address()
    }

    fn websocket_endpoint(&self) -> Option<String> {
        let address = self.active_connection()?.keepalive_address()?;
        Some(self.with_token(address))
    }

    fn should_retry(&self, endpoint: &str, error: &ApiError) -> bool {
        let Some(connection) = self.active_connection() else {
            return false;
        };
        let Some(path) = connection.is_serving(endpoint) else {
            return false;
        };
        if !error.is_transient() {
            return false;
        }
        warn!(path = %path, endpoint, error = %error, "dropping unreachable path");
        connection.remove_path(path);
        !connection.available_paths().is_empty()
    }
}
