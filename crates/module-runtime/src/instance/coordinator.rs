//! Coordinator state shared by the instance, the coordinator thread and
//! framework access handles, plus the coordinator loop itself.

use std::sync::{Arc, Weak};

use mf_01_peer_discovery::{PeerDirectory, PeerDiscoveryService, PeerRegistry};
use mf_02_event_dispatch::EventDispatcher;
use parking_lot::{Mutex, RwLock};
use shared_types::{ConfigProvider, Latch, ModuleDependency, ModuleHandle, ModuleLifecycleState, ModuleUniqueId};
use tracing::{debug, error, info, trace, warn};

use crate::access::FrameworkAccess;
use crate::instance::cell::HostedModule;
use crate::instance::control::InstanceControl;

pub(crate) struct InstanceCore {
    pub(crate) self_ref: Weak<InstanceCore>,
    pub(crate) self_handle: RwLock<ModuleHandle>,
    pub(crate) dependencies: Vec<ModuleDependency>,
    pub(crate) module: Arc<Mutex<dyn HostedModule>>,
    pub(crate) config: Arc<dyn ConfigProvider>,
    pub(crate) registry: Arc<PeerRegistry>,
    pub(crate) discovery: PeerDiscoveryService,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) control: Arc<InstanceControl>,
}

impl InstanceCore {
    pub(crate) fn is_started(&self) -> bool {
        self.control.is(&self.control.started)
    }

    pub(crate) fn self_handle(&self) -> ModuleHandle {
        self.self_handle.read().clone()
    }

    pub(crate) fn self_id(&self) -> ModuleUniqueId {
        self.self_handle.read().unique_id
    }

    /// Handle for `id`: ourselves, or any peer discovery knows about.
    pub(crate) fn resolve_peer(&self, id: &ModuleUniqueId) -> Option<ModuleHandle> {
        if *id == self.self_id() {
            return Some(self.self_handle());
        }
        self.registry.get(id, false)
    }

    /// Every dependency has at least one matching active peer.
    pub(crate) fn dependencies_satisfied(&self) -> bool {
        self.dependencies.iter().all(|dep| match dep.version {
            Some(version) => self.registry.contains_type_version(dep.type_id, version, true),
            None => self.registry.contains_type(dep.type_id, true),
        })
    }

    /// No active peer shares our identity.
    pub(crate) fn is_unique(&self) -> bool {
        !self.registry.contains(&self.self_id(), true)
    }

    pub(crate) fn enable_module(&self) -> bool {
        let control = &self.control;
        if control.is(&control.module_active) {
            warn!("Module already enabled, cancelling enable");
            return false;
        }

        if let Err(e) = self.dispatcher.on_enable() {
            error!(error = %e, "Event dispatcher failed to enable");
            return false;
        }

        let framework = FrameworkAccess::new(self.self_ref.clone());
        let enabled = self.module.lock().enable_module(framework);
        if !enabled {
            self.dispatcher.on_disable();
            return false;
        }

        control.set(&control.module_active, true);
        self.discovery.update_self_state(ModuleLifecycleState::Active);
        self.discovery.send_state_multicast();
        true
    }

    pub(crate) fn disable_module(&self) {
        let control = &self.control;
        if !control.is(&control.module_active) {
            warn!("Module not enabled, cancelling disable");
            return;
        }

        // Drain deliveries before the module's own disable runs.
        self.dispatcher.on_disable();
        self.module.lock().disable_module();

        control.set(&control.module_active, false);
        self.discovery.update_self_state(ModuleLifecycleState::Inactive);
        self.discovery.send_state_multicast();
        debug!("Module disabled by coordinator");
    }

    /// Final teardown after the loop exits.
    fn on_stopped(&self) {
        let control = &self.control;
        if control.is(&control.module_active) {
            self.disable_module();
        }
        control.set(&control.started, false);

        self.discovery.update_self_state(ModuleLifecycleState::Dead);
        self.discovery.send_state_multicast();
        self.discovery.stop();
        self.dispatcher.stop();

        control.set(&control.stopped, true);
        info!(module = %self.self_handle().describe(), "Instance stopped");
    }
}

/// Body of the `mf-coordinator` thread.
pub(crate) fn run(core: Arc<InstanceCore>, exit_on_enable_failure: bool, exited: Arc<Latch>) {
    let control = Arc::clone(&core.control);
    trace!("Coordinator loop started");

    while !control.is(&control.stop_requested) {
        if control.is(&control.module_active) {
            if control.take(&control.disable_requested) {
                core.disable_module();
            } else if !core.dependencies_satisfied() {
                info!("Dependencies lost, disabling module until they return");
                core.disable_module();
                control.set(&control.enable_requested, true);
            } else if !core.is_unique() {
                error!(
                    module = %core.self_id(),
                    "Another active instance has the same id, stopping instance"
                );
                control.set(&control.stop_requested, true);
                continue;
            }
        } else if control.is(&control.enable_requested)
            && core.dependencies_satisfied()
            && core.is_unique()
        {
            control.set(&control.enable_requested, false);
            info!("Initiating module enable");
            if !core.enable_module() && exit_on_enable_failure {
                error!("Module enable failed, stopping instance");
                control.set(&control.stop_requested, true);
                continue;
            }
        }

        control.wait_for_wake();
    }

    trace!("Coordinator loop finished");
    core.on_stopped();
    exited.release();
}
