//! The hosted module behind its serializing lock.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};

use mf_02_event_dispatch::{ModuleCallbacks, OutReply, RequestHandler, StateChangeHandler};
use shared_types::{Message, ModuleHandle, ModuleLifecycleState, ModuleUniqueId};
use tracing::{error, info, warn};

use crate::access::FrameworkAccess;
use crate::module::Module;

/// Where the module is in its enable/disable cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnabledState {
    Disabled = 0,
    Enabling = 1,
    Enabled = 2,
    Disabling = 3,
}

impl EnabledState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Enabling,
            2 => Self::Enabled,
            3 => Self::Disabling,
            _ => Self::Disabled,
        }
    }
}

/// Coordinator-side view of the module, used without naming its type.
pub(crate) trait HostedModule: ModuleCallbacks {
    /// Returns `true` if the module is enabled afterwards.
    fn enable_module(&mut self, framework: FrameworkAccess) -> bool;

    fn disable_module(&mut self);

    fn enabled_state(&self) -> EnabledState;
}

pub(crate) struct ModuleCell<M: Module> {
    module: M,
    label: String,
    state: AtomicU8,
}

impl<M: Module> ModuleCell<M> {
    pub(crate) fn new(module: M) -> Self {
        let label = format!("{}:{}", module.name(), module.unique_id().instance_id);
        Self {
            module,
            label,
            state: AtomicU8::new(EnabledState::Disabled as u8),
        }
    }

    fn transition(&self, from: EnabledState, to: EnabledState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn set(&self, state: EnabledState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

impl<M: Module> HostedModule for ModuleCell<M> {
    fn enable_module(&mut self, framework: FrameworkAccess) -> bool {
        if !self.transition(EnabledState::Disabled, EnabledState::Enabling) {
            warn!(module = %self.label, "Tried to enable module twice, ignoring");
            return self.enabled_state() == EnabledState::Enabled;
        }

        info!(module = %self.label, "Enabling module");
        let module = &mut self.module;
        match catch_unwind(AssertUnwindSafe(|| module.enable(framework))) {
            Ok(Ok(())) => {
                self.set(EnabledState::Enabled);
                info!(module = %self.label, "Module enabled");
                true
            }
            Ok(Err(e)) => {
                self.set(EnabledState::Disabled);
                error!(module = %self.label, error = %e, "Module failed to enable");
                false
            }
            Err(_) => {
                self.set(EnabledState::Disabled);
                error!(module = %self.label, "Module panicked while enabling");
                false
            }
        }
    }

    fn disable_module(&mut self) {
        if !self.transition(EnabledState::Enabled, EnabledState::Disabling) {
            warn!(module = %self.label, "Tried to disable module that is not enabled, ignoring");
            return;
        }

        info!(module = %self.label, "Disabling module");
        let module = &mut self.module;
        if catch_unwind(AssertUnwindSafe(|| module.disable())).is_err() {
            error!(module = %self.label, "Module panicked while disabling");
        }
        self.set(EnabledState::Disabled);
        info!(module = %self.label, "Module disabled");
    }

    fn enabled_state(&self) -> EnabledState {
        EnabledState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

impl<M: Module> RequestHandler for ModuleCell<M> {
    fn handle_request(&mut self, request: &Message, sender: ModuleUniqueId) -> OutReply {
        self.module.handle_request(request, sender)
    }
}

impl<M: Module> StateChangeHandler for ModuleCell<M> {
    fn handle_module_state_change(
        &mut self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        last_state: ModuleLifecycleState,
    ) {
        self.module.handle_module_state_change(peer, new_state, last_state);
    }
}

impl<M: Module> ModuleCallbacks for ModuleCell<M> {
    fn is_enabled(&self) -> bool {
        self.enabled_state() == EnabledState::Enabled
    }
}
