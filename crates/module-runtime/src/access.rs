//! # Framework Access
//!
//! The handle a module receives on `enable`. It reaches the instance through
//! a weak reference: once the instance stops or is dropped, every call
//! returns [`FrameworkError::NotRunning`] instead of keeping engines alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use mf_01_peer_discovery::PeerDirectory;
use mf_02_event_dispatch::{EventHandler, InReply, LifecycleControl, SubscriptionHandle, SystemCommand};
use shared_types::{ConfigProvider, Message, MessageType, ModuleHandle, ModuleUniqueId};
use tracing::debug;

use crate::errors::FrameworkError;
use crate::instance::InstanceCore;

/// Module-facing API of a running instance.
#[derive(Clone)]
pub struct FrameworkAccess {
    core: Weak<InstanceCore>,
}

impl FrameworkAccess {
    pub(crate) fn new(core: Weak<InstanceCore>) -> Self {
        Self { core }
    }

    fn core(&self) -> Result<Arc<InstanceCore>, FrameworkError> {
        self.core
            .upgrade()
            .filter(|core| core.is_started())
            .ok_or(FrameworkError::NotRunning)
    }

    /// This instance's handle, with bound transport endpoints.
    pub fn self_handle(&self) -> Result<ModuleHandle, FrameworkError> {
        Ok(self.core()?.self_handle())
    }

    pub fn config(&self) -> Result<Arc<dyn ConfigProvider>, FrameworkError> {
        Ok(Arc::clone(&self.core()?.config))
    }

    /// Read-only view of the peers discovered so far.
    pub fn peers(&self) -> Result<Arc<dyn PeerDirectory>, FrameworkError> {
        let registry: Arc<dyn PeerDirectory> = self.core()?.registry.clone();
        Ok(registry)
    }

    pub fn publish(&self, message: &Message) -> Result<(), FrameworkError> {
        self.core()?.dispatcher.publish(message)?;
        Ok(())
    }

    /// Deliver every event whose topic starts with `topic` to `handler`
    /// until unsubscribed or the module disables.
    pub fn subscribe(
        &self,
        topic: MessageType,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, FrameworkError> {
        Ok(self.core()?.dispatcher.subscribe(topic, handler)?)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<bool, FrameworkError> {
        Ok(self.core()?.dispatcher.unsubscribe(handle))
    }

    /// Send a request to a known peer (or to ourselves).
    ///
    /// # Errors
    ///
    /// `UnknownPeer` if discovery has never seen `target`.
    pub fn send_request(&self, target: ModuleUniqueId, message: Message) -> Result<InReply, FrameworkError> {
        let core = self.core()?;
        let handle = core.resolve_peer(&target).ok_or(FrameworkError::UnknownPeer(target))?;
        Ok(core.dispatcher.send_request(&handle, message)?)
    }

    /// Replace the additional state carried by our heartbeats. Sent with the
    /// next regular heartbeat.
    pub fn update_additional_state(&self, additional_state: Vec<u8>) -> Result<(), FrameworkError> {
        self.core()?.discovery.update_self_additional_state(additional_state);
        Ok(())
    }

    /// Send a heartbeat now.
    pub fn force_state_broadcast(&self) -> Result<(), FrameworkError> {
        self.core()?.discovery.send_state_multicast();
        Ok(())
    }

    pub fn request_disable_module(&self) -> Result<(), FrameworkError> {
        self.core()?.control.request_disable_module();
        Ok(())
    }

    /// Ask the instance to stop. Returns immediately.
    pub fn request_stop_instance(&self) -> Result<(), FrameworkError> {
        self.core()?.control.request_stop_instance();
        Ok(())
    }

    /// Ask peer `id` to enable its module. `true` if it acknowledged within
    /// `timeout`.
    pub fn request_enable_remote_instance(&self, id: ModuleUniqueId, timeout: Duration) -> bool {
        self.remote_command(id, SystemCommand::Enable, timeout)
    }

    pub fn request_disable_remote_instance(&self, id: ModuleUniqueId, timeout: Duration) -> bool {
        self.remote_command(id, SystemCommand::Disable, timeout)
    }

    pub fn request_stop_remote_instance(&self, id: ModuleUniqueId, timeout: Duration) -> bool {
        self.remote_command(id, SystemCommand::Stop, timeout)
    }

    fn remote_command(&self, id: ModuleUniqueId, command: SystemCommand, timeout: Duration) -> bool {
        let reply = match self.send_request(id, command.request()) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(peer = %id, command = ?command, error = %e, "Remote command not sent");
                return false;
            }
        };
        match reply.get_timeout(timeout) {
            Ok(ack) => command.is_acked_by(&ack),
            Err(e) => {
                debug!(peer = %id, command = ?command, error = %e, "Remote command not acknowledged");
                false
            }
        }
    }
}

impl std::fmt::Debug for FrameworkAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkAccess")
            .field("running", &self.core().is_ok())
            .finish()
    }
}
