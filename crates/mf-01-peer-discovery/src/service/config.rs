//! Discovery tunables.

use std::time::Duration;

use shared_types::ConfigProvider;

/// Config key for the heartbeat interval in milliseconds.
pub const BROADCAST_INTERVAL_KEY: &str = "MF_DISCOVERY_BROADCAST_MS";

/// Heartbeat interval used when none is configured.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(1000);

/// A peer silent for longer than this many intervals is declared dead.
pub const PEER_TIMEOUT_FACTOR: u32 = 4;

/// Discovery engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Time between heartbeats and timeout sweeps.
    pub broadcast_interval: Duration,
    /// Block `start` for two intervals so the first heartbeats arrive.
    pub wait_for_discovery: bool,
    /// Ignore heartbeats from peers of our own module type.
    pub exclude_same_type: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            wait_for_discovery: false,
            exclude_same_type: false,
        }
    }
}

impl DiscoveryConfig {
    /// Read the broadcast interval from `config`, keeping defaults otherwise.
    #[must_use]
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        let broadcast_interval = config
            .get_as_long(BROADCAST_INTERVAL_KEY)
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_BROADCAST_INTERVAL, Duration::from_millis);
        Self {
            broadcast_interval,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    #[must_use]
    pub fn with_wait_for_discovery(mut self, wait: bool) -> Self {
        self.wait_for_discovery = wait;
        self
    }

    #[must_use]
    pub fn with_exclude_same_type(mut self, exclude: bool) -> Self {
        self.exclude_same_type = exclude;
        self
    }

    /// Silence after which a peer is removed.
    #[must_use]
    pub fn peer_timeout(&self) -> Duration {
        self.broadcast_interval * PEER_TIMEOUT_FACTOR
    }
}
