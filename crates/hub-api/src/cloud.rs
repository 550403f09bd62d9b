//! Cloud hub-info API.

use hublink_protocol::constants::{
    ROUTE_CONFIGURATION, ROUTE_HUB_BY_CODE, ROUTE_HUBS, ROUTE_ULTRASONIC_PLAY,
    SECURITY_CODE_QUERY_KEY,
};
use hublink_protocol::{HubConfiguration, HubLocalInfo, HubNameInfo};
use reqwest::Method;

use crate::ApiFuture;
use crate::client::{RestClient, encode_segment};

/// Lookups answered by the cloud service.
pub trait HubInfoApi: Send + Sync {
    /// Resolves a pairing code to the hub id and its LAN address.
    fn get_info(&self, security_code: &str) -> ApiFuture<'_, HubLocalInfo>;

    /// Looks up the display name of a hub.
    fn get_name(&self, hub_id: &str) -> ApiFuture<'_, HubNameInfo>;

    /// Fetches the hub configuration through the cloud tunnel.
    fn get_configuration(&self, hub_id: &str) -> ApiFuture<'_, HubConfiguration>;

    /// Asks the hub to play its ultrasonic pairing signal.
    fn request_ultrasonic_signal(&self, hub_id: &str) -> ApiFuture<'_, ()>;
}

/// Cloud hub-info client over a static base address.
pub struct CloudApi {
    rest: RestClient,
}

impl CloudApi {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

fn hub_route(hub_id: &str, suffix: &str) -> String {
    format!("{ROUTE_HUBS}{}/{suffix}", encode_segment(hub_id))
}

impl HubInfoApi for CloudApi {
    fn get_info(&self, security_code: &str) -> ApiFuture<'_, HubLocalInfo> {
        let code = security_code.to_string();
        Box::pin(async move {
            self.rest
                .get_json::<HubLocalInfo>(ROUTE_HUB_BY_CODE, &[(SECURITY_CODE_QUERY_KEY, code.as_str())])
                .await
        })
    }

    fn get_name(&self, hub_id: &str) -> ApiFuture<'_, HubNameInfo> {
        let route = hub_route(hub_id, "");
        Box::pin(async move { self.rest.get_json::<HubNameInfo>(&route, &[]).await })
    }

    fn get_configuration(&self, hub_id: &str) -> ApiFuture<'_, HubConfiguration> {
        let route = hub_route(hub_id, ROUTE_CONFIGURATION);
        Box::pin(async move {
            self.rest
                .get_json::<HubConfiguration>(&route, &[])
                .await
        })
    }

    fn request_ultrasonic_signal(&self, hub_id: &str) -> ApiFuture<'_, ()> {
        let route = hub_route(hub_id, ROUTE_ULTRASONIC_PLAY);
        Box::pin(async move {
            self.rest.request(Method::PUT, &route, &[], None).await?;
            Ok::<(), crate::error::ApiError>(())
        })
    }
}
