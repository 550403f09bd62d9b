//! APIs served by the hub itself, over whichever path is active.

use hublink_protocol::constants::{ROUTE_CONFIGURATION, ROUTE_PARTICIPANTS, ROUTE_STOP_SHARING};
use hublink_protocol::{FailableVec, HubConfiguration, NewParticipant, Participant};
use reqwest::Method;

use crate::ApiFuture;
use crate::client::{RestClient, encode_segment};
use crate::error::ApiError;

/// Hub configuration and presentation controls.
pub trait HubConfigurationApi: Send + Sync {
    /// Fetches the configuration.
    ///
    /// With an explicit `endpoint` the request goes to that base address and
    /// is never retried; otherwise the client's endpoint provider decides.
    fn get_configuration(&self, endpoint: Option<&str>) -> ApiFuture<'_, HubConfiguration>;

    /// Stops the current screen share.
    fn stop_sharing(&self) -> ApiFuture<'_, ()>;
}

/// Participant registration on the hub.
pub trait ParticipantApi: Send + Sync {
    /// Base address hub-relative requests would go to right now.
    fn endpoint(&self) -> Option<String>;

    fn list_participants(&self) -> ApiFuture<'_, Vec<Participant>>;

    fn create_participant(&self, user_name: &str) -> ApiFuture<'_, Participant>;

    /// Deletes a participant on the hub at `endpoint`. The request owns
    /// everything it needs and may outlive `self`.
    fn delete_participant_at(
        &self,
        endpoint: &str,
        participant_id: &str,
    ) -> ApiFuture<'static, ()>;

    /// Deletes a participant on the hub at the current endpoint, resolved
    /// when this is called.
    fn delete_participant(&self, participant_id: &str) -> ApiFuture<'static, ()> {
        match self.endpoint() {
            Some(endpoint) => self.delete_participant_at(&endpoint, participant_id),
            None => Box::pin(async { Err::<(), _>(ApiError::BasePathUndefined) }),
        }
    }
}

/// Client for the hub's own REST API.
pub struct HubApi {
    rest: RestClient,
}

impl HubApi {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

impl HubConfigurationApi for HubApi {
    fn get_configuration(&self, endpoint: Option<&str>) -> ApiFuture<'_, HubConfiguration> {
        let endpoint = endpoint.map(str::to_string);
        Box::pin(async move {
            let body = match endpoint {
                Some(base) => {
                    self.rest
                        .request_at(&base, Method::GET, ROUTE_CONFIGURATION, &[], None)
                        .await?
                }
                None => {
                    self.rest
                        .request(Method::GET, ROUTE_CONFIGURATION, &[], None)
                        .await?
                }
            };
            Ok::<HubConfiguration, ApiError>(serde_json::from_slice(&body)?)
        })
    }

    fn stop_sharing(&self) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            self.rest
                .request(Method::PUT, ROUTE_STOP_SHARING, &[], None)
                .await?;
            Ok::<(), ApiError>(())
        })
    }
}

impl ParticipantApi for HubApi {
    fn endpoint(&self) -> Option<String> {
        self.rest.base_path().ok()
    }

    fn list_participants(&self) -> ApiFuture<'_, Vec<Participant>> {
        Box::pin(async move {
            let list = self
                .rest
                .get_json::<FailableVec<Participant>>(ROUTE_PARTICIPANTS, &[])
                .await?;
            Ok::<Vec<Participant>, ApiError>(list.into_inner())
        })
    }

    fn create_participant(&self, user_name: &str) -> ApiFuture<'_, Participant> {
        let new = NewParticipant {
            user_name: user_name.to_string(),
        };
        Box::pin(async move {
            let body = serde_json::to_value(&new)?;
            let resp = self
                .rest
                .request(Method::POST, ROUTE_PARTICIPANTS, &[], Some(&body))
                .await?;
            Ok::<Participant, ApiError>(serde_json::from_slice(&resp)?)
        })
    }

    fn delete_participant_at(
        &self,
        endpoint: &str,
        participant_id: &str,
    ) -> ApiFuture<'static, ()> {
        let route = format!("{ROUTE_PARTICIPANTS}/{}", encode_segment(participant_id));
        let endpoint = endpoint.to_string();
        let rest = self.rest.clone();
        Box::pin(async move {
            rest.request_at(&endpoint, Method::DELETE, &route, &[], None)
                .await?;
            Ok::<(), ApiError>(())
        })
    }
}
