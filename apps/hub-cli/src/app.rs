//! Client lifecycle: connect, follow hub events, shut down on Ctrl-C.

use std::sync::Arc;

use hublink_hub_api::{TokenContainer, TokenProvider};
use hublink_hub_connection::{
    ConnectionError, ConnectionManagerState, ConnectionObserver, HubClient, HubEvent,
    InMemoryPreferences,
};
use tokio::sync::broadcast::error::RecvError;

use crate::config::Config;

/// What the client was asked to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    HubId(String),
    SecurityCode(String),
}

/// Logs manager state transitions.
struct StateLogger;

impl ConnectionObserver for StateLogger {
    fn on_state_changed(&self, state: &ConnectionManagerState) {
        tracing::info!(?state, "connection state changed");
    }

    fn on_connect_completed(&self, error: Option<&ConnectionError>) {
        match error {
            None => tracing::info!("connect attempt succeeded"),
            Some(e) => tracing::warn!(error = %e, "connect attempt failed"),
        }
    }
}

/// How the event loop reacts to a single hub event.
#[derive(Debug, PartialEq)]
enum Step {
    Continue,
    Reconnect,
    Fail(ConnectionError),
}

fn next_step(event: &HubEvent, was_connected: bool) -> Step {
    match event {
        HubEvent::ConnectAttemptCompleted(Some(e)) => Step::Fail(e.clone()),
        HubEvent::StateChanged(ConnectionManagerState::Error(_)) if was_connected => {
            Step::Reconnect
        }
        _ => Step::Continue,
    }
}

/// Runs the client until Ctrl-C or until a connect attempt fails.
pub async fn run(config: Config, target: Target) -> anyhow::Result<()> {
    let tokens: Arc<dyn TokenProvider> = Arc::new(TokenContainer::new(config.token.clone()));
    let preferences = Arc::new(InMemoryPreferences::new(config.user_name.clone()));
    if config.user_name.is_none() {
        tracing::warn!("no user name configured; the hub will be resolved but not joined");
    }

    let client = HubClient::build(config.network.clone(), Some(tokens), preferences)?;
    let observer: Arc<dyn ConnectionObserver> = Arc::new(StateLogger);
    let observer_id = client.manager.add_observer(&observer);
    let mut events = client.manager.subscribe();

    match &target {
        Target::HubId(hub_id) => client.manager.connect_to_hub(hub_id),
        Target::SecurityCode(code) => client.manager.connect_with_code(code),
    }

    let mut was_connected = false;
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down...");
                break Ok(());
            }
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(skipped = n, "event listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break Ok(()),
                };

                if let HubEvent::ConnectedToHub { hub_name } = &event {
                    tracing::info!(hub = %hub_name, "joined hub");
                }

                match next_step(&event, was_connected) {
                    Step::Continue => {}
                    Step::Reconnect => {
                        tracing::warn!("session lost, reconnecting");
                        if !client.manager.reconnect() {
                            break Err(anyhow::anyhow!("session lost and no hub to reconnect to"));
                        }
                    }
                    Step::Fail(e) => break Err(e.into()),
                }

                if let HubEvent::StateChanged(state) = &event {
                    was_connected = matches!(state, ConnectionManagerState::Connected);
                }
            }
        }
    };

    client.manager.disconnect();
    client.manager.remove_observer(observer_id);
    result
}

#[cfg(test)]
mod tests {
    use hublink_hub_connection::Stage;

    use super::*;

    #[test]
    fn failed_attempt_stops_the_loop() {
        let event = HubEvent::ConnectAttemptCompleted(Some(ConnectionError::ConnectionSetupTimeout));
        assert_eq!(
            next_step(&event, false),
            Step::Fail(ConnectionError::ConnectionSetupTimeout)
        );
    }

    #[test]
    fn error_after_connected_reconnects() {
        let event = HubEvent::StateChanged(ConnectionManagerState::Error(
            ConnectionError::KeepaliveTransportError("reset".into()),
        ));
        assert_eq!(next_step(&event, true), Step::Reconnect);
        assert_eq!(next_step(&event, false), Step::Continue);
    }

    #[test]
    fn progress_events_continue() {
        let events = [
            HubEvent::ConnectAttemptCompleted(None),
            HubEvent::StateChanged(ConnectionManagerState::Connecting(Stage::Rest)),
            HubEvent::KeepAliveUp,
        ];
        for event in &events {
            assert_eq!(next_step(event, false), Step::Continue);
        }
    }
}
