//! Hub connection core.
//!
//! Resolves a hub over its local and cloud paths, registers this client
//! as a participant, and supervises the keepalive socket. The
//! [`ConnectionManager`] drives these steps as one state machine and
//! reports progress through observers and the [`EventBus`].

pub mod builder;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod keepalive;
pub mod manager;
pub mod observers;
pub mod participants;
pub mod preferences;
pub mod reachability;
pub mod session;
pub mod transport;
pub mod types;
pub mod ws_client;

mod pumps {
    pub(crate) mod read;
    pub(crate) mod write;
}

use std::future::Future;
use std::pin::Pin;

pub use builder::HubClient;
pub use config::NetworkConfig;
pub use connectivity::{HubConnectivity, HubConnectivityService};
pub use error::{ConfigError, ConnectionError, DiscoveryFailure};
pub use events::{EventBus, HubEvent};
pub use keepalive::{KeepAlive, KeepAliveService};
pub use manager::ConnectionManager;
pub use observers::{ConnectionObserver, ObserverId};
pub use participants::{ParticipantRegistrar, ParticipantsService, Registration};
pub use preferences::{InMemoryPreferences, Preferences};
pub use reachability::{InterfaceReachability, Reachability};
pub use session::HubConnection;
pub use transport::{SocketDelegate, TransportError, WebSocketTransport};
pub use types::{ConnectionManagerState, ConnectionState, ConnectionType, LivenessEvent, Stage};
pub use ws_client::WsTransport;

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
