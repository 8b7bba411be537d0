//! Client configuration.

use std::time::Duration;

/// Default room service base URL.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Default realtime endpoint.
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:8000/ws";

/// Environment variable overriding [`DuelConfig::api_base`].
pub const ENV_API_BASE: &str = "SUDOKU_DUEL_API_BASE";

/// Environment variable overriding [`DuelConfig::socket_url`].
pub const ENV_SOCKET_URL: &str = "SUDOKU_DUEL_SOCKET_URL";

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Configuration for a [`DuelClient`](crate::DuelClient).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sudoku_duel_client::DuelConfig;
///
/// let config = DuelConfig::new()
///     .with_api_base("https://duel.example.com")
///     .with_event_channel_capacity(0)
///     .with_heartbeat_interval(Duration::from_secs(2));
/// assert_eq!(config.api_base, "https://duel.example.com");
/// assert_eq!(config.event_channel_capacity, 1);
/// ```
#[derive(Debug, Clone)]
pub struct DuelConfig {
    /// Base URL of the room service (`/api/room/...` is appended).
    pub api_base: String,
    /// URL of the realtime channel.
    pub socket_url: String,
    /// Liveness ping period. Defaults to **5 seconds**.
    pub heartbeat_interval: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events other than `Disconnected` are
    /// dropped with a warning. Defaults to **256**; values below 1 are
    /// clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the channel task gets to close the transport on
    /// [`disconnect`](crate::connection::ConnectionManager::disconnect)
    /// before it is aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Per-request timeout for room service calls and for opening the
    /// realtime channel. Defaults to **10 seconds**.
    pub request_timeout: Duration,
    /// Re-dial attempts after an abrupt link drop. Defaults to **5**.
    pub reconnect_attempts: u32,
    /// Wait before each re-dial. Defaults to **1 second**.
    pub reconnect_delay: Duration,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            socket_url: DEFAULT_SOCKET_URL.to_owned(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl DuelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the endpoints taken from [`ENV_API_BASE`] and
    /// [`ENV_SOCKET_URL`] when set to a non-empty value.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(api_base) = non_empty(ENV_API_BASE) {
            config.api_base = api_base;
        }
        if let Some(socket_url) = non_empty(ENV_SOCKET_URL) {
            config.socket_url = socket_url;
        }
        config
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    #[must_use]
    pub fn with_socket_url(mut self, socket_url: impl Into<String>) -> Self {
        self.socket_url = socket_url.into();
        self
    }

    /// Set the heartbeat period. Clamped to at least one millisecond.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the event channel capacity. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// A zero timeout aborts the channel task without waiting.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Zero attempts disables re-dialing; a dropped link then ends the channel.
    #[must_use]
    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }
}
