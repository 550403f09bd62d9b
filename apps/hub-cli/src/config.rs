//! Client configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/hublink/client.toml`
//! - Windows: `%APPDATA%/hublink/client.toml`

use std::path::{Path, PathBuf};

use hublink_hub_connection::NetworkConfig;
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Display name registered with the hub. Without one the client
    /// resolves the hub but does not join it.
    #[serde(default)]
    pub user_name: Option<String>,

    /// Cloud access token.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from `path`, creating a default if not found.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix (may contain the access token).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("hublink").join("client.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("hublink")
            .join("client.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.user_name.is_none());
        assert!(config.token.is_none());
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"
            user_name = "Ada"

            [network]
            polling_interval_secs = 3
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.user_name.as_deref(), Some("Ada"));
        assert_eq!(config.network.polling_interval_secs, 3);
        assert_eq!(config.network.connection_timeout_secs, 15);
    }

    #[test]
    fn config_path_not_empty() {
        let path = config_path().unwrap();
        assert!(path.to_string_lossy().contains("hublink"));
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("client.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn config_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("client.toml");

        let config = Config {
            user_name: Some("Ada".into()),
            token: Some("secret".into()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
