use std::time::Duration;

/// How often a heartbeat is sent over the keepalive socket.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);

/// Time allowed between registering a participant and the first
/// confirmed heartbeat before the attempt is abandoned.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Port of the hub's local REST API, used when only the hub IP is known.
pub const DEFAULT_LOCAL_API_PORT: u16 = 8080;

/// Path prefix of the hub's local REST API.
pub const LOCAL_API_PREFIX: &str = "/api/v1/";

/// Largest keepalive frame the supervisor will try to decode.
pub const MAX_KEEPALIVE_MESSAGE_SIZE: usize = 64 * 1024;

/// Query parameter carrying the access token on socket endpoints.
pub const TOKEN_QUERY_KEY: &str = "token";

/// Query parameter carrying the pairing code on the hub-info lookup.
pub const SECURITY_CODE_QUERY_KEY: &str = "security_code";

/// Cloud route: hub-info lookup by pairing code.
pub const ROUTE_HUB_BY_CODE: &str = "hubs/code/";

/// Cloud route prefix: everything addressed to one hub.
pub const ROUTE_HUBS: &str = "hubs/";

/// Hub-relative route: the hub configuration snapshot.
pub const ROUTE_CONFIGURATION: &str = "configuration";

/// Hub-relative route: participant collection.
pub const ROUTE_PARTICIPANTS: &str = "participants";

/// Hub-relative route: stop the current screen share.
pub const ROUTE_STOP_SHARING: &str = "presenting/stop";

/// Hub-relative route suffix: play the ultrasonic pairing signal.
pub const ROUTE_ULTRASONIC_PLAY: &str = "ultrasonic/play/";
