//! Error taxonomy of the connection core.

use std::fmt;

use hublink_hub_api::ApiError;

use crate::types::ConnectionType;

/// Why a hub lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFailure {
    /// The lookup service does not know the hub.
    HubNotFound,
    /// Lookup by hub identifier failed for another reason.
    InvalidHubId,
    /// Lookup by pairing code failed for another reason.
    InvalidSecurityCode,
}

impl fmt::Display for DiscoveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HubNotFound => "hub not found",
            Self::InvalidHubId => "invalid hub id",
            Self::InvalidSecurityCode => "invalid security code",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the connection core.
///
/// Carried inside the connection states, which are compared for
/// deduplication, so the type is cloneable and comparable and keeps only
/// rendered messages of underlying transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("discovery failed ({reason}): {message}")]
    DiscoveryFailed {
        reason: DiscoveryFailure,
        message: String,
    },

    #[error("{path} path failed: {message}")]
    PathConnectFailed {
        path: ConnectionType,
        message: String,
    },

    #[error("all connection paths failed")]
    AllPathsFailed,

    #[error("participant registration failed: {0}")]
    ParticipantRegistrationFailed(String),

    #[error("connection setup timed out")]
    ConnectionSetupTimeout,

    #[error("keepalive response timed out")]
    KeepaliveResponseTimeout,

    #[error("keepalive transport error: {0}")]
    KeepaliveTransportError(String),

    #[error("hub reported error: {0}")]
    KeepaliveServerError(String),

    #[error("unexpected state: {0}")]
    UnexpectedState(String),
}

impl ConnectionError {
    pub(crate) fn path_failed(path: ConnectionType, error: &ApiError) -> Self {
        Self::PathConnectFailed {
            path,
            message: error.to_string(),
        }
    }
}

/// Errors loading network configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
