//! Typed event bus for UI-facing listeners.

use tokio::sync::broadcast;
use tracing::trace;

use crate::error::ConnectionError;
use crate::types::{ConnectionManagerState, ConnectionType};

const EVENT_CAPACITY: usize = 64;

/// Events published by the connection core.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A session path set started discovery.
    ConnectionInProgress,
    /// A session path set settled in an error.
    ConnectionError(ConnectionError),
    /// A session path set became connected over a new path.
    ConnectionEstablished { path: ConnectionType },
    /// A session path set became the active one.
    ActiveConnectionResolved { hub_id: Option<String> },
    KeepAliveUp,
    KeepAliveDown(Option<ConnectionError>),
    /// A connect attempt settled; `None` means success.
    ConnectAttemptCompleted(Option<ConnectionError>),
    StateChanged(ConnectionManagerState),
    /// The session is live and the hub's name is known.
    ConnectedToHub { hub_name: String },
}

/// Cloneable publisher handle; every clone feeds the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HubEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: HubEvent) {
        trace!(?event, "publishing hub event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(HubEvent::ConnectionInProgress);
        bus.clone().publish(HubEvent::KeepAliveUp);

        assert_eq!(rx.recv().await.unwrap(), HubEvent::ConnectionInProgress);
        assert_eq!(rx.recv().await.unwrap(), HubEvent::KeepAliveUp);
    }

    #[test]
    fn publish_without_subscribers() {
        EventBus::new().publish(HubEvent::KeepAliveDown(None));
    }
}
