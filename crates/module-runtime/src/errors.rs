//! Runtime error types.

use mf_01_peer_discovery::DiscoveryError;
use fabric_telemetry::TelemetryError;
use mf_02_event_dispatch::DispatchError;
use shared_types::ModuleUniqueId;
use thiserror::Error;

/// Why an instance failed to start. Nothing is left running when this is
/// returned.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("instance already started")]
    AlreadyStarted,

    #[error("event dispatcher failed to start: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("peer discovery failed to start: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("failed to spawn coordinator thread: {0}")]
    Spawn(String),

    /// The builder was not given a required collaborator.
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("failed to open heartbeat socket: {0}")]
    Heartbeat(#[from] std::io::Error),

    #[error("logging setup failed: {0}")]
    Logging(#[from] TelemetryError),
}

/// Errors returned to module code through `FrameworkAccess`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameworkError {
    /// The instance behind this handle has stopped or been dropped.
    #[error("framework instance not running")]
    NotRunning,

    /// No peer with this id is known.
    #[error("unknown peer {0}")]
    UnknownPeer(ModuleUniqueId),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Failure reported by a module's `enable`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ModuleError {
    pub reason: String,
}

impl ModuleError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<FrameworkError> for ModuleError {
    fn from(err: FrameworkError) -> Self {
        Self::new(err.to_string())
    }
}
