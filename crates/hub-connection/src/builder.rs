//! Wires the connection core to its real collaborators.

use std::sync::Arc;

use hublink_hub_api::{
    ApiError, CloudApi, EndpointProvider, HubApi, RestClient, StaticEndpoint, TokenProvider,
};
use tokio::sync::mpsc;

use crate::config::NetworkConfig;
use crate::connectivity::HubConnectivityService;
use crate::events::EventBus;
use crate::keepalive::KeepAliveService;
use crate::manager::ConnectionManager;
use crate::participants::ParticipantsService;
use crate::preferences::Preferences;
use crate::reachability::InterfaceReachability;
use crate::ws_client::WsTransport;

/// A fully wired hub client.
pub struct HubClient {
    pub manager: ConnectionManager,
    pub connectivity: Arc<HubConnectivityService>,
    /// Cloud lookup service (hub names, ultrasonic signal).
    pub cloud: Arc<CloudApi>,
    /// API of the active hub, retried across its paths.
    pub hub: Arc<HubApi>,
    pub bus: EventBus,
}

impl HubClient {
    /// Builds every collaborator from `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(
        config: NetworkConfig,
        tokens: Option<Arc<dyn TokenProvider>>,
        preferences: Arc<dyn Preferences>,
    ) -> Result<Self, ApiError> {
        let bus = EventBus::new();
        let cloud_base: Arc<dyn EndpointProvider> =
            Arc::new(StaticEndpoint::new(config.base_path.clone()));

        let cloud = Arc::new(CloudApi::new(RestClient::new(
            cloud_base.clone(),
            tokens.clone(),
        )?));
        // Only ever asked with explicit endpoints during discovery.
        let probe = Arc::new(HubApi::new(RestClient::new(cloud_base, tokens.clone())?));

        let connectivity = Arc::new(HubConnectivityService::new(
            cloud.clone(),
            probe,
            tokens.clone(),
            Arc::new(InterfaceReachability),
            bus.clone(),
            config.clone(),
        ));
        let active_hub: Arc<dyn EndpointProvider> = connectivity.clone();

        let hub = Arc::new(HubApi::new(RestClient::new(
            active_hub.clone(),
            tokens,
        )?));
        let participants = Arc::new(ParticipantsService::new(hub.clone(), preferences));

        let (liveness_tx, liveness_rx) = mpsc::unbounded_channel();
        let keepalive = Arc::new(KeepAliveService::new(
            Arc::new(WsTransport::new()),
            active_hub,
            &config,
            liveness_tx,
            bus.clone(),
        ));

        let manager = ConnectionManager::new(
            connectivity.clone(),
            participants,
            keepalive,
            liveness_rx,
            bus.clone(),
            config,
        );

        Ok(Self {
            manager,
            connectivity,
            cloud,
            hub,
            bus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hublink_hub_api::TokenContainer;

    use crate::preferences::InMemoryPreferences;
    use crate::types::ConnectionManagerState;

    #[tokio::test]
    async fn builds_idle_client() {
        let client = HubClient::build(
            NetworkConfig::default(),
            Some(Arc::new(TokenContainer::new(Some("t".into())))),
            Arc::new(InMemoryPreferences::new(Some("Ada".into()))),
        )
        .unwrap();

        assert_eq!(client.manager.state(), ConnectionManagerState::Unknown);
        assert!(client.connectivity.presenting_endpoint().is_none());
        assert!(client.connectivity.websocket_endpoint().is_none());
        assert!(client.manager.hub_name().is_none());
    }

    #[tokio::test]
    async fn unreachable_cloud_settles_in_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = NetworkConfig {
            base_path: format!("http://{addr}/api/"),
            ..NetworkConfig::default()
        };
        let client = HubClient::build(
            config,
            None,
            Arc::new(InMemoryPreferences::new(Some("Ada".into()))),
        )
        .unwrap();
        let mut events = client.manager.subscribe();

        client.manager.connect_to_hub("hub-1");
        let settled = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                if let crate::HubEvent::ConnectAttemptCompleted(error) =
                    events.recv().await.unwrap()
                {
                    return error;
                }
            }
        })
        .await
        .unwrap();

        assert!(settled.is_some());
        assert!(matches!(
            client.manager.state(),
            ConnectionManagerState::Error(_)
        ));
    }
}
