//! Delivery queue tunables.

use std::time::Duration;

use shared_types::ConfigProvider;
use tracing::warn;

/// Queue capacity; `0` means unbounded.
pub const BUFFER_SIZE_KEY: &str = "MF_INMSG_BUFFER_SIZE";

/// Overflow policy: `block`/`0` or `drop`/`1`.
pub const BUFFER_MODE_KEY: &str = "MF_INMSG_BUFFER_MODE";

/// Sleep between capacity checks under the block policy, in milliseconds.
pub const BLOCK_WAIT_KEY: &str = "MF_INMSG_BUFFER_BLOCK_WAIT_MS";

pub const DEFAULT_BUFFER_CAPACITY: usize = 100_000;

pub const DEFAULT_BLOCK_WAIT: Duration = Duration::from_millis(10);

/// What a producer does when the delivery queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Sleep until space frees up or the dispatcher stops.
    #[default]
    Block,
    /// Discard the inbound message.
    Drop,
}

impl OverflowPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "block" => Some(Self::Block),
            "1" | "drop" => Some(Self::Drop),
            _ => None,
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// `None` for an unbounded queue.
    pub capacity: Option<usize>,
    pub policy: OverflowPolicy,
    pub block_wait: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_BUFFER_CAPACITY),
            policy: OverflowPolicy::Block,
            block_wait: DEFAULT_BLOCK_WAIT,
        }
    }
}

impl DispatchConfig {
    /// Read tunables from `config`; invalid values are logged and replaced by
    /// defaults.
    #[must_use]
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        let mut out = Self::default();

        if let Some(size) = config.get_as_long(BUFFER_SIZE_KEY) {
            match usize::try_from(size) {
                Ok(0) => out.capacity = None,
                Ok(n) => out.capacity = Some(n),
                Err(_) => warn!(key = BUFFER_SIZE_KEY, value = size, "Invalid buffer size"),
            }
        }
        if let Some(mode) = config.get_as_string(BUFFER_MODE_KEY) {
            match OverflowPolicy::parse(&mode) {
                Some(policy) => out.policy = policy,
                None => warn!(key = BUFFER_MODE_KEY, value = %mode, "Invalid buffer mode"),
            }
        }
        if let Some(ms) = config.get_as_long(BLOCK_WAIT_KEY) {
            match u64::try_from(ms) {
                Ok(ms) if ms > 0 => out.block_wait = Duration::from_millis(ms),
                _ => warn!(key = BLOCK_WAIT_KEY, value = ms, "Invalid block wait"),
            }
        }
        out
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }
}
