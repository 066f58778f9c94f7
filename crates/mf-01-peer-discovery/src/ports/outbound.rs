//! # Driven Ports (Outbound SPI)
//!
//! These are the interfaces the discovery engine **requires** the host to
//! provide.

use std::time::Duration;

use shared_types::{ModuleHandle, ModuleLifecycleState};

use crate::domain::HeartbeatTransportError;

/// Abstract multicast group for heartbeat frames.
///
/// # Thread Safety
///
/// `send` is called from the send loop and from coordinator-triggered
/// broadcasts while `recv` blocks on the receive loop, so implementations
/// must allow concurrent use.
pub trait HeartbeatTransport: Send + Sync {
    /// Join the group. Frames sent before joining are not received.
    fn join(&self) -> Result<(), HeartbeatTransportError>;

    /// Leave the group, waking a blocked `recv`.
    fn leave(&self);

    /// Send one frame to every member of the group, ourselves included.
    fn send(&self, frame: &[u8]) -> Result<(), HeartbeatTransportError>;

    /// Wait up to `timeout` for the next frame. `Ok(None)` on timeout.
    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, HeartbeatTransportError>;
}

/// Receives peer lifecycle transitions observed by the discovery engine.
///
/// Called while the engine holds its membership lock, so the registry
/// reflects `new_state` for the duration of the call. Implementations must
/// return quickly and must not call back into the discovery engine.
pub trait PeerStateListener: Send + Sync {
    fn on_peer_state_change(
        &self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        last_state: ModuleLifecycleState,
    );
}
