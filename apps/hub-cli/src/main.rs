//! HubLink command-line client entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::app::Target;

/// Joins a meeting-room hub and keeps the session alive until Ctrl-C.
#[derive(Parser, Debug)]
#[command(name = "hublink", about = "Connect to a meeting-room hub")]
struct Cli {
    /// Identifier of the hub to connect to.
    #[arg(required_unless_present = "code", conflicts_with = "code")]
    hub_id: Option<String>,

    /// Pairing code shown on the hub's screen.
    #[arg(long)]
    code: Option<String>,

    /// Display name to register with (overrides the config file).
    #[arg(long)]
    name: Option<String>,

    /// Path to the config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn target(&self) -> Option<Target> {
        match (&self.hub_id, &self.code) {
            (Some(hub_id), _) => Some(Target::HubId(hub_id.clone())),
            (None, Some(code)) => Some(Target::SecurityCode(code.clone())),
            (None, None) => None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting HubLink client");

    let mut config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    if let Some(name) = &cli.name {
        config.user_name = Some(name.clone());
    }
    tracing::info!(user = ?config.user_name, base = %config.network.base_path, "configuration loaded");

    let target = cli
        .target()
        .ok_or_else(|| anyhow::anyhow!("either a hub id or --code is required"))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, target))?;

    tracing::info!("client shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_id_argument() {
        let cli = Cli::parse_from(["hublink", "hub-1"]);
        assert!(matches!(cli.target(), Some(Target::HubId(id)) if id == "hub-1"));
    }

    #[test]
    fn code_flag() {
        let cli = Cli::parse_from(["hublink", "--code", "C123", "--name", "Ada"]);
        assert!(matches!(cli.target(), Some(Target::SecurityCode(c)) if c == "C123"));
        assert_eq!(cli.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn hub_id_and_code_conflict() {
        assert!(Cli::try_parse_from(["hublink", "hub-1", "--code", "C123"]).is_err());
        assert!(Cli::try_parse_from(["hublink"]).is_err());
    }
}
