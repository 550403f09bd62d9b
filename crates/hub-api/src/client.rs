//! Shared REST transport.
//!
//! Async HTTP client using `reqwest`. Hub-relative requests resolve their
//! base address through an [`EndpointProvider`] and are re-sent while the
//! provider reports that another path is available.

use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::endpoint::{EndpointProvider, TokenProvider};
use crate::error::ApiError;

/// Characters escaped when an identifier is embedded in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Escapes an identifier for use inside a URL path.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Joins a relative route onto a base address.
///
/// The base is treated as a directory even when it lacks a trailing slash.
pub fn join_url(base: &str, route: &str) -> Result<Url, ApiError> {
    let mut base_url = Url::parse(base).map_err(|_| ApiError::InvalidBaseUrl(base.to_string()))?;
    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(&path);
    }
    base_url
        .join(route.trim_start_matches('/'))
        .map_err(|_| ApiError::InvalidBaseUrl(base.to_string()))
}

/// REST client bound to one endpoint provider.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    endpoints: Arc<dyn EndpointProvider>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl RestClient {
    /// Creates a client with a default `reqwest` configuration.
    pub fn new(
        endpoints: Arc<dyn EndpointProvider>,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::Http)?;
        Ok(Self::with_http(http, endpoints, tokens))
    }

    /// Creates a client around an existing `reqwest` client.
    pub fn with_http(
        http: reqwest::Client,
        endpoints: Arc<dyn EndpointProvider>,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> Self {
        Self {
            http,
            endpoints,
            tokens,
        }
    }

    /// The provider's current base address.
    pub fn base_path(&self) -> Result<String, ApiError> {
        self.endpoints
            .endpoint_base_path()
            .ok_or(ApiError::BasePathUndefined)
    }

    /// Sends a request to `route` relative to the provider's current base,
    /// retrying while the provider allows it.
    pub async fn request(
        &self,
        method: Method,
        route: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, ApiError> {
        loop {
            let base = self.base_path()?;
            let url = join_url(&base, route)?;
            match self.send(method.clone(), url, query, body).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if self.endpoints.should_retry(&base, &e) => {
                    debug!(base = %base, route, error = %e, "retrying request on another path");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends a request to `route` relative to an explicit base, without retry.
    pub async fn request_at(
        &self,
        base: &str,
        method: Method,
        route: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, ApiError> {
        let url = join_url(base, route)?;
        self.send(method, url, query, body).await
    }

    /// GETs a hub-relative route and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let body = self.request(Method::GET, route, query, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, ApiError> {
        trace!(%method, %url, "sending request");
        let mut req = self.http.request(method, url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = self.tokens.as_ref().and_then(|t| t.token()) {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
