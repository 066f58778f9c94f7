//! # Module Lifecycle Coordinator
//!
//! ```text
//! start():  dispatcher.start ─► discovery.start ─► advertise Inactive ─► mf-coordinator
//!
//! mf-coordinator loop (woken by requests and peer transitions):
//!   active   + disable requested        ─► disable
//!   active   + dependency lost          ─► disable, re-enable when it returns
//!   active   + duplicate id is active   ─► stop instance
//!   inactive + enable requested + deps satisfied + unique ─► enable
//!
//! exit:     disable if active ─► advertise Dead ─► stop discovery ─► stop dispatcher
//! ```
//!
//! Enabling starts the dispatcher's delivery thread before the module's
//! `enable` runs; disabling drains it before the module's `disable` runs.
//! Both module calls take the same lock as deliveries.

mod cell;
mod control;
mod coordinator;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mf_01_peer_discovery::{DiscoveryConfig, HeartbeatTransport, PeerDirectory, PeerDiscoveryService, PeerRegistry};
use mf_02_event_dispatch::{DispatchConfig, EventDispatcher, LifecycleControl, SharedModule};
use parking_lot::{Mutex, RwLock};
use shared_bus::MessageTransport;
use shared_types::{ConfigProvider, Latch, ModuleHandle, ModuleLifecycleState};
use tracing::{error, info, warn};

pub use self::cell::EnabledState;
pub(crate) use self::coordinator::InstanceCore;

use self::cell::{HostedModule, ModuleCell};
use self::control::{InstanceControl, PeerChangeRouter};
use crate::errors::StartError;
use crate::module::Module;

/// How an instance behaves once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Enable the module as soon as its preconditions hold.
    pub auto_enable: bool,
    /// Stop the instance if the module fails to enable.
    pub exit_on_enable_failure: bool,
    /// Let discovery run for a couple of intervals before returning.
    pub wait_for_discovery: bool,
    /// Ignore peers of our own module type. Duplicate identities go
    /// unnoticed while this is set.
    pub disable_equal_type_interconnect: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            auto_enable: true,
            exit_on_enable_failure: true,
            wait_for_discovery: true,
            disable_equal_type_interconnect: false,
        }
    }
}

impl StartOptions {
    #[must_use]
    pub fn with_auto_enable(mut self, value: bool) -> Self {
        self.auto_enable = value;
        self
    }

    #[must_use]
    pub fn with_exit_on_enable_failure(mut self, value: bool) -> Self {
        self.exit_on_enable_failure = value;
        self
    }

    #[must_use]
    pub fn with_wait_for_discovery(mut self, value: bool) -> Self {
        self.wait_for_discovery = value;
        self
    }

    #[must_use]
    pub fn with_equal_type_interconnect(mut self, allowed: bool) -> Self {
        self.disable_equal_type_interconnect = !allowed;
        self
    }
}

/// One hosted module with its discovery and dispatch engines.
pub struct ModuleInstance {
    core: Arc<InstanceCore>,
    discovery_config: DiscoveryConfig,
    coordinator: Mutex<Option<JoinHandle<()>>>,
    exited: Mutex<Option<Arc<Latch>>>,
}

impl ModuleInstance {
    /// Wire `module` to its engines. Nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new<M: Module>(
        module: M,
        config: Arc<dyn ConfigProvider>,
        heartbeat: Arc<dyn HeartbeatTransport>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        let discovery_config = DiscoveryConfig::from_config(config.as_ref());
        Self::with_discovery_config(module, config, heartbeat, transport, discovery_config)
    }

    /// As [`new`](Self::new) with explicit discovery tunables.
    #[must_use]
    pub fn with_discovery_config<M: Module>(
        module: M,
        config: Arc<dyn ConfigProvider>,
        heartbeat: Arc<dyn HeartbeatTransport>,
        transport: Arc<dyn MessageTransport>,
        discovery_config: DiscoveryConfig,
    ) -> Self {
        let handle = ModuleHandle::new(module.unique_id(), module.version(), module.name());
        let dependencies = module.dependencies();

        let cell = Arc::new(Mutex::new(ModuleCell::new(module)));
        let hosted: Arc<Mutex<dyn HostedModule>> = cell.clone();
        let shared: SharedModule = cell;

        let control = Arc::new(InstanceControl::new());
        let dispatch_control: Arc<dyn LifecycleControl> = control.clone();
        let dispatcher = EventDispatcher::new(
            shared,
            transport,
            dispatch_control,
            DispatchConfig::from_config(config.as_ref()),
        );
        let registry = Arc::new(PeerRegistry::new());
        let discovery = PeerDiscoveryService::new(Arc::clone(&registry), heartbeat);

        let core = Arc::new_cyclic(|self_ref| InstanceCore {
            self_ref: self_ref.clone(),
            self_handle: RwLock::new(handle),
            dependencies,
            module: hosted,
            config,
            registry,
            discovery,
            dispatcher,
            control,
        });

        Self {
            core,
            discovery_config,
            coordinator: Mutex::new(None),
            exited: Mutex::new(None),
        }
    }

    /// Start dispatch, then discovery, then the coordinator thread.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted`, or the first engine failure. Engines started before
    /// the failure are stopped again.
    pub fn start(&self, options: StartOptions) -> Result<(), StartError> {
        let core = &self.core;
        let control = &core.control;
        if control.is(&control.started) {
            warn!("Instance already started");
            return Err(StartError::AlreadyStarted);
        }
        control.set(&control.stopped, false);

        let bound = match core.dispatcher.start(&core.self_handle()) {
            Ok(bound) => bound,
            Err(e) => {
                error!(error = %e, "Failed to start event dispatcher, cancelling start");
                control.set(&control.stopped, true);
                return Err(e.into());
            }
        };
        *core.self_handle.write() = bound.clone();

        let listener = Arc::new(PeerChangeRouter {
            dispatcher: Arc::clone(&core.dispatcher),
            control: Arc::clone(control),
        });
        let discovery_config = self
            .discovery_config
            .with_wait_for_discovery(options.wait_for_discovery)
            .with_exclude_same_type(options.disable_equal_type_interconnect);
        if let Err(e) = core.discovery.start(bound.clone(), listener, discovery_config) {
            error!(error = %e, "Failed to start peer discovery, cancelling start");
            core.dispatcher.stop();
            control.set(&control.stopped, true);
            return Err(e.into());
        }

        core.discovery.update_self_state(ModuleLifecycleState::Inactive);
        core.discovery.send_state_multicast();

        control.set(&control.enable_requested, options.auto_enable);
        control.set(&control.disable_requested, false);
        control.set(&control.stop_requested, false);
        control.set(&control.started, true);

        let exited = Arc::new(Latch::new());
        let spawned = {
            let core = Arc::clone(core);
            let exited = Arc::clone(&exited);
            let exit_on_failure = options.exit_on_enable_failure;
            thread::Builder::new()
                .name("mf-coordinator".to_string())
                .spawn(move || coordinator::run(core, exit_on_failure, exited))
        };
        match spawned {
            Ok(handle) => {
                *self.coordinator.lock() = Some(handle);
                *self.exited.lock() = Some(exited);
            }
            Err(e) => {
                control.set(&control.started, false);
                core.discovery.update_self_state(ModuleLifecycleState::Dead);
                core.discovery.send_state_multicast();
                core.discovery.stop();
                core.dispatcher.stop();
                control.set(&control.stopped, true);
                return Err(StartError::Spawn(e.to_string()));
            }
        }

        info!(module = %bound.describe(), auto_enable = options.auto_enable, "Instance started");
        Ok(())
    }

    pub fn request_enable_module(&self) {
        self.core.control.request_enable_module();
    }

    pub fn request_disable_module(&self) {
        self.core.control.request_disable_module();
    }

    /// Ask the coordinator to stop. Returns immediately.
    pub fn request_stop_instance(&self) {
        self.core.control.request_stop_instance();
    }

    /// Stop the instance and wait for the coordinator to finish.
    pub fn stop_instance(&self) {
        let control = &self.core.control;
        if !control.is(&control.started) {
            warn!("Instance not running, nothing to stop");
            return;
        }
        control.request_stop_instance();
        self.join_execution();
    }

    /// Block until the coordinator loop has exited.
    pub fn join_execution(&self) {
        let Some(exited) = self.exited.lock().clone() else {
            warn!("Coordinator not started, nothing to join");
            return;
        };

        let handle = self.coordinator.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                warn!("join_execution called from the coordinator thread, not joining");
                *self.coordinator.lock() = Some(handle);
                return;
            }
            exited.wait();
            if handle.join().is_err() {
                error!("Coordinator thread panicked");
            }
        } else {
            exited.wait();
        }
    }

    /// Forward a peer transition as discovery would.
    pub fn peer_state_change(
        &self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        last_state: ModuleLifecycleState,
    ) {
        self.core.control.wake();
        self.core.dispatcher.on_peer_state_change(peer, new_state, last_state);
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.core.is_started()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.core.control.is(&self.core.control.stopped)
    }

    /// The module is enabled and advertised as active.
    #[must_use]
    pub fn is_module_active(&self) -> bool {
        self.core.control.is(&self.core.control.module_active)
    }

    #[must_use]
    pub fn module_state(&self) -> EnabledState {
        self.core.module.lock().enabled_state()
    }

    /// Our handle; carries transport endpoints once started.
    #[must_use]
    pub fn self_handle(&self) -> ModuleHandle {
        self.core.self_handle()
    }

    /// Lifecycle state we currently advertise.
    #[must_use]
    pub fn advertised_state(&self) -> ModuleLifecycleState {
        self.core.discovery.self_state()
    }

    #[must_use]
    pub fn discovery_config(&self) -> DiscoveryConfig {
        self.discovery_config
    }

    #[must_use]
    pub fn peers(&self) -> Arc<dyn PeerDirectory> {
        self.core.registry.clone()
    }

    #[must_use]
    pub fn dispatcher(&self) -> Arc<EventDispatcher> {
        Arc::clone(&self.core.dispatcher)
    }
}

impl Drop for ModuleInstance {
    fn drop(&mut self) {
        if self.is_started() {
            self.stop_instance();
        }
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("module", &self.self_handle().describe())
            .field("started", &self.is_started())
            .field("module_active", &self.is_module_active())
            .finish()
    }
}
