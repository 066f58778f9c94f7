//! # Handler Traits
//!
//! The closed set of callbacks the dispatcher invokes. All of them run on
//! the delivery thread while the module's serializing lock is held, so
//! module code never sees two callbacks at once.

use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{Message, ModuleHandle, ModuleLifecycleState, ModuleUniqueId};

use crate::reply::OutReply;

/// Receives events matching a subscription.
///
/// Implemented for any `Fn(&Message, ModuleUniqueId) + Send + Sync`.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, message: &Message, sender: ModuleUniqueId);
}

impl<F> EventHandler for F
where
    F: Fn(&Message, ModuleUniqueId) + Send + Sync,
{
    fn handle_event(&self, message: &Message, sender: ModuleUniqueId) {
        self(message, sender);
    }
}

/// Answers requests addressed to the module.
pub trait RequestHandler {
    /// Decide how to reply. The default answers nothing.
    fn handle_request(&mut self, request: &Message, sender: ModuleUniqueId) -> OutReply {
        let _ = (request, sender);
        OutReply::NoReply
    }
}

/// Observes peer lifecycle transitions.
pub trait StateChangeHandler {
    fn handle_module_state_change(
        &mut self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        last_state: ModuleLifecycleState,
    ) {
        let _ = (peer, new_state, last_state);
    }
}

/// Everything the dispatcher needs from the module it serves.
pub trait ModuleCallbacks: RequestHandler + StateChangeHandler + Send {
    /// Deliveries are dropped unless this returns `true`.
    fn is_enabled(&self) -> bool;
}

/// The module behind its serializing lock.
pub type SharedModule = Arc<Mutex<dyn ModuleCallbacks>>;

/// Lifecycle actions remote peers may trigger through system messages.
pub trait LifecycleControl: Send + Sync {
    fn request_enable_module(&self);
    fn request_disable_module(&self);
    fn request_stop_instance(&self);
}
