//! Domain Errors for Peer Discovery

use shared_types::ModuleUniqueId;
use thiserror::Error;

/// Registry mutation failures. All are logged and leave the registry as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// `add` for an id that is already registered.
    #[error("peer {0} already registered")]
    AlreadyPresent(ModuleUniqueId),

    /// Mutation of an id that is not registered.
    #[error("peer {0} not registered")]
    NotFound(ModuleUniqueId),
}

/// Heartbeat frame encoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame shorter than its header.
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),

    /// Frame does not start with the protocol magic.
    #[error("bad frame magic")]
    BadMagic,

    /// Frame uses a protocol version this build does not speak.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Frame body could not be (de)serialized.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Frame advertises a lifecycle ordinal outside the known states.
    #[error("unknown lifecycle ordinal {0}")]
    UnknownState(u8),
}

/// Errors from heartbeat transports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeartbeatTransportError {
    /// Operation requires a joined group.
    #[error("not joined to the multicast group")]
    NotJoined,

    /// Socket-level failure.
    #[error("heartbeat I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for HeartbeatTransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Discovery engine lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// `start` on a running engine.
    #[error("discovery already started")]
    AlreadyStarted,

    /// Joining the multicast group failed.
    #[error("failed to join multicast group: {0}")]
    Join(#[from] HeartbeatTransportError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn discovery worker: {0}")]
    Spawn(String),
}
