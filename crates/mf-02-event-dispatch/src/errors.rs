//! Dispatch error types.

use shared_bus::TransportError;
use shared_types::ModuleUniqueId;
use thiserror::Error;

/// Errors from dispatcher operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The dispatcher (or its consumer, for subscriptions) is not running.
    #[error("dispatcher not running")]
    NotRunning,

    /// `start` on a started dispatcher.
    #[error("dispatcher already started")]
    AlreadyStarted,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The delivery thread could not be spawned.
    #[error("failed to spawn delivery thread: {0}")]
    Spawn(String),
}

/// Why a request produced no reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// A timed wait elapsed. The request stays outstanding.
    #[error("timed out waiting for reply")]
    Timeout,

    /// The requester cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// The dispatcher was disabled or stopped while the request was pending.
    #[error("request aborted by dispatcher shutdown")]
    Aborted,

    /// The target is not a joined peer.
    #[error("unknown target {0}")]
    TargetUnknown(ModuleUniqueId),

    /// The transport refused the request.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RequestError {
    pub(crate) fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::UnknownPeer(id) => Self::TargetUnknown(id),
            other => Self::Transport(other.to_string()),
        }
    }
}
