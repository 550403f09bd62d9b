//! Public types for the hub connection core.

use std::fmt;

use crate::error::ConnectionError;

/// A transport path to the hub.
///
/// Declaration order is preference order: `Local` wins over `Cloud`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionType {
    Local,
    Cloud,
}

impl ConnectionType {
    /// Every path, most preferred first.
    pub const ALL: [ConnectionType; 2] = [ConnectionType::Local, ConnectionType::Cloud];
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Cloud => f.write_str("cloud"),
        }
    }
}

/// Aggregated state of one session path set.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Error(ConnectionError),
    /// Connected over the given path, which is available and has a configuration.
    Connected(ConnectionType),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Checkpoint in the connect and teardown pipeline.
///
/// Ordered: a connect attempt only moves forward through the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Rest,
    Participant,
    WebSocket,
    Complete,
}

/// Externally observed state of the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionManagerState {
    /// Nothing has happened yet.
    Unknown,
    NotConnected,
    /// Looking for hubs nearby. Not entered by the connect flow.
    Discovery,
    Connecting(Stage),
    Connected,
    Error(ConnectionError),
}

impl ConnectionManagerState {
    /// Stage a teardown would start from, or `None` when nothing is held.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Connected => Some(Stage::Complete),
            Self::Connecting(stage) => Some(*stage),
            _ => None,
        }
    }
}

/// Liveness transition reported by the keepalive supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum LivenessEvent {
    Up,
    /// Socket lost; `None` means a clean close.
    Down(Option<ConnectionError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_is_preferred() {
        assert!(ConnectionType::Local < ConnectionType::Cloud);
        assert_eq!(ConnectionType::ALL[0], ConnectionType::Local);
        assert_eq!(ConnectionType::Cloud.to_string(), "cloud");
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Rest < Stage::Participant);
        assert!(Stage::Participant < Stage::WebSocket);
        assert!(Stage::WebSocket < Stage::Complete);
    }

    #[test]
    fn manager_state_stage() {
        assert_eq!(ConnectionManagerState::Connected.stage(), Some(Stage::Complete));
        assert_eq!(
            ConnectionManagerState::Connecting(Stage::Participant).stage(),
            Some(Stage::Participant)
        );
        assert_eq!(ConnectionManagerState::NotConnected.stage(), None);
        assert_eq!(
            ConnectionManagerState::Error(ConnectionError::AllPathsFailed).stage(),
            None
        );
    }

    #[test]
    fn state_equality() {
        assert_eq!(
            ConnectionState::Connected(ConnectionType::Local),
            ConnectionState::Connected(ConnectionType::Local)
        );
        assert_ne!(
            ConnectionState::Connected(ConnectionType::Local),
            ConnectionState::Connected(ConnectionType::Cloud)
        );
        assert_ne!(
            ConnectionManagerState::Error(ConnectionError::ConnectionSetupTimeout),
            ConnectionManagerState::Error(ConnectionError::AllPathsFailed)
        );
    }
}
