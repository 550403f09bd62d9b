//! Network configuration consumed by the connection core.

use std::path::Path;
use std::time::Duration;

use hublink_protocol::constants::{
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_LOCAL_API_PORT, DEFAULT_POLLING_INTERVAL,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Timing and addressing for hub connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Cloud REST base address, with a trailing slash.
    pub base_path: String,

    /// Seconds between keepalive heartbeats.
    pub polling_interval_secs: u64,

    /// Seconds allowed from participant registration to the first heartbeat.
    pub connection_timeout_secs: u64,

    /// Seconds to wait for any reply after a heartbeat; `0` disables the check.
    pub response_timeout_secs: u64,

    /// Port of the hub's local REST API when only its IP is known.
    pub local_api_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_path: "https://api.hublink.io/v1/".into(),
            polling_interval_secs: DEFAULT_POLLING_INTERVAL.as_secs(),
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT.as_secs(),
            response_timeout_secs: 0,
            local_api_port: DEFAULT_LOCAL_API_PORT,
        }
    }
}

impl NetworkConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Keepalive response timeout, if enabled.
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_secs > 0).then(|| Duration::from_secs(self.response_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.polling_interval(), Duration::from_secs(5));
        assert_eq!(config.connection_timeout(), Duration::from_secs(15));
        assert_eq!(config.response_timeout(), None);
        assert_eq!(config.local_api_port, 8080);
        assert!(config.base_path.ends_with('/'));
    }

    #[test]
    fn partial_toml() {
        let config = NetworkConfig::from_toml_str(
            r#"
            base_path = "https://cloud.example.com/api/"
            response_timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.base_path, "https://cloud.example.com/api/");
        assert_eq!(config.response_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.polling_interval_secs, 5);
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = NetworkConfig::from_toml_str("polling_interval_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("network.toml");
        std::fs::write(&path, "connection_timeout_secs = 30\n").unwrap();

        let config = NetworkConfig::load(&path).unwrap();
        assert_eq!(config.connection_timeout(), Duration::from_secs(30));

        let missing = NetworkConfig::load(&tmp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
