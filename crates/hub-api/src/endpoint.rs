//! Endpoint resolution and credentials for REST requests.

use std::sync::RwLock;

use crate::error::ApiError;

/// Supplies the base address requests are sent to and decides whether a
/// failed request may be retried.
///
/// Implemented by the hub connectivity service, whose answer depends on
/// which transport path is currently serving the hub.
pub trait EndpointProvider: Send + Sync {
    /// Base address for hub-relative REST requests.
    fn endpoint_base_path(&self) -> Option<String>;

    /// Address of the keepalive socket, including credentials.
    fn websocket_endpoint(&self) -> Option<String>;

    /// Called after a request against `endpoint` failed with `error`.
    ///
    /// Returning `true` means the endpoint has been re-resolved and the
    /// request should be sent again.
    fn should_retry(&self, endpoint: &str, error: &ApiError) -> bool;
}

/// A fixed base address that is never retried.
#[derive(Debug, Clone)]
pub struct StaticEndpoint {
    base_path: String,
}

impl StaticEndpoint {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl EndpointProvider for StaticEndpoint {
    fn endpoint_base_path(&self) -> Option<String> {
        Some(self.base_path.clone())
    }

    fn websocket_endpoint(&self) -> Option<String> {
        None
    }

    fn should_retry(&self, _endpoint: &str, _error: &ApiError) -> bool {
        false
    }
}

/// Source of the cloud access token.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// In-memory token holder.
#[derive(Debug, Default)]
pub struct TokenContainer {
    token: RwLock<Option<String>>,
}

impl TokenContainer {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

impl TokenProvider for TokenContainer {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkErrorKind;

    #[test]
    fn static_endpoint_never_retries() {
        let ep = StaticEndpoint::new("https://cloud.example.com/api/");
        assert_eq!(
            ep.endpoint_base_path().as_deref(),
            Some("https://cloud.example.com/api/")
        );
        assert!(ep.websocket_endpoint().is_none());
        let err = ApiError::Network {
            kind: NetworkErrorKind::TimedOut,
            message: "slow".into(),
        };
        assert!(!ep.should_retry("https://cloud.example.com/api/", &err));
    }

    #[test]
    fn token_container_updates() {
        let tokens = TokenContainer::default();
        assert!(tokens.token().is_none());
        tokens.set_token(Some("abc".into()));
        assert_eq!(tokens.token().as_deref(), Some("abc"));
        tokens.set_token(None);
        assert!(tokens.token().is_none());
    }
}
