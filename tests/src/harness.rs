//! Fixtures shared by the integration scenarios.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use mf_01_peer_discovery::{DiscoveryConfig, HeartbeatFrame, InMemoryMulticastGroup};
use module_runtime::{
    FrameworkAccess, Module, ModuleError, ModuleInstance, OutReply, RequestHandler, StartOptions,
    StateChangeHandler,
};
use parking_lot::Mutex;
use shared_bus::InMemoryMessageBus;
use shared_types::{
    ConfigProvider, Latch, Message, MessageType, ModuleDependency, ModuleHandle, ModuleLifecycleState,
    ModuleUniqueId, StaticConfigProvider, TransportEndpoints,
};

/// Heartbeat interval used by every scenario.
pub const INTERVAL: Duration = Duration::from_millis(20);

/// Upper bound for any asynchronous condition to settle.
pub const SETTLE: Duration = Duration::from_secs(5);

/// Poll `cond` until it holds or [`SETTLE`] elapses.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + SETTLE;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn topic(bytes: &[u8]) -> anyhow::Result<MessageType> {
    MessageType::new(bytes.to_vec()).map_err(|e| anyhow!("bad topic: {e}"))
}

// =============================================================================
// JOURNAL
// =============================================================================

/// Ordered record of lifecycle callbacks across every module in a scenario.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn record(&self, entry: String) {
        self.entries.lock().push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }
}

// =============================================================================
// SCRIPTED MODULE
// =============================================================================

/// Handles shared between a [`Scripted`] module and the test body.
#[derive(Clone, Default)]
pub struct Observer {
    pub framework: Arc<Mutex<Option<FrameworkAccess>>>,
    pub events: Arc<Mutex<Vec<(ModuleUniqueId, Vec<u8>)>>>,
    pub requests: Arc<Mutex<Vec<(ModuleUniqueId, Vec<u8>)>>>,
    /// While set and unreleased, event handlers block on it.
    pub gate: Arc<Mutex<Option<Arc<Latch>>>>,
}

impl Observer {
    /// The framework handle of the currently enabled module.
    pub fn framework(&self) -> anyhow::Result<FrameworkAccess> {
        self.framework
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("module not enabled"))
    }

    #[must_use]
    pub fn event_payloads(&self) -> Vec<Vec<u8>> {
        self.events.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    /// Make event handlers wait until the returned latch is released.
    #[must_use]
    pub fn close_gate(&self) -> Arc<Latch> {
        let latch = Arc::new(Latch::new());
        *self.gate.lock() = Some(Arc::clone(&latch));
        latch
    }
}

/// A module whose behaviour is configured by the scenario.
pub struct Scripted {
    id: ModuleUniqueId,
    version: u16,
    dependencies: Vec<ModuleDependency>,
    subscriptions: Vec<MessageType>,
    journal: Journal,
    observer: Observer,
}

impl Scripted {
    #[must_use]
    pub fn new(type_id: u16, instance_id: u64, journal: &Journal) -> (Self, Observer) {
        let observer = Observer::default();
        let module = Self {
            id: ModuleUniqueId::new(type_id, instance_id),
            version: 1,
            dependencies: Vec::new(),
            subscriptions: Vec::new(),
            journal: journal.clone(),
            observer: observer.clone(),
        };
        (module, observer)
    }

    #[must_use]
    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn depends_on(mut self, dependency: ModuleDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    #[must_use]
    pub fn subscribes(mut self, topic: MessageType) -> Self {
        self.subscriptions.push(topic);
        self
    }
}

impl RequestHandler for Scripted {
    fn handle_request(&mut self, request: &Message, sender: ModuleUniqueId) -> OutReply {
        self.observer.requests.lock().push((sender, request.payload.clone()));
        OutReply::Immediate(request.clone())
    }
}

impl StateChangeHandler for Scripted {
    fn handle_module_state_change(
        &mut self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        _last_state: ModuleLifecycleState,
    ) {
        self.journal
            .record(format!("{} saw {} {}", self.id, peer.unique_id, new_state));
    }
}

impl Module for Scripted {
    fn unique_id(&self) -> ModuleUniqueId {
        self.id
    }

    fn version(&self) -> u16 {
        self.version
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn dependencies(&self) -> Vec<ModuleDependency> {
        self.dependencies.clone()
    }

    fn enable(&mut self, framework: FrameworkAccess) -> Result<(), ModuleError> {
        for topic in &self.subscriptions {
            let events = Arc::clone(&self.observer.events);
            let gate = Arc::clone(&self.observer.gate);
            framework.subscribe(
                topic.clone(),
                Arc::new(move |message: &Message, sender: ModuleUniqueId| {
                    let latch = gate.lock().clone();
                    if let Some(latch) = latch {
                        latch.wait();
                    }
                    events.lock().push((sender, message.payload.clone()));
                }),
            )?;
        }
        *self.observer.framework.lock() = Some(framework);
        self.journal.record(format!("enable {}", self.id));
        Ok(())
    }

    fn disable(&mut self) {
        self.observer.framework.lock().take();
        self.journal.record(format!("disable {}", self.id));
    }
}

// =============================================================================
// FABRIC
// =============================================================================

/// One heartbeat group and one message bus shared by a scenario's instances.
pub struct Fabric {
    pub group: InMemoryMulticastGroup,
    pub bus: InMemoryMessageBus,
    /// Nonce carried by injected heartbeats.
    phantom_nonce: u32,
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new()
    }
}

impl Fabric {
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: InMemoryMulticastGroup::new(),
            bus: InMemoryMessageBus::new(),
            phantom_nonce: rand::random(),
        }
    }

    /// Options every scenario starts with: no discovery wait, same-type
    /// peers visible.
    #[must_use]
    pub fn options() -> StartOptions {
        StartOptions::default()
            .with_wait_for_discovery(false)
            .with_equal_type_interconnect(true)
    }

    pub fn launch<M: Module>(&self, module: M) -> anyhow::Result<ModuleInstance> {
        self.launch_with(module, StaticConfigProvider::new(), Self::options())
    }

    pub fn launch_with<M: Module>(
        &self,
        module: M,
        config: StaticConfigProvider,
        options: StartOptions,
    ) -> anyhow::Result<ModuleInstance> {
        let config: Arc<dyn ConfigProvider> = Arc::new(config);
        let instance = ModuleInstance::with_discovery_config(
            module,
            config,
            self.group.endpoint(),
            self.bus.transport(),
            DiscoveryConfig::default().with_broadcast_interval(INTERVAL),
        );
        instance.start(options).context("instance failed to start")?;
        Ok(instance)
    }

    /// Multicast a heartbeat for a peer that exists only on the wire.
    pub fn inject(&self, handle: &ModuleHandle, state: ModuleLifecycleState) -> anyhow::Result<()> {
        let frame = HeartbeatFrame::new(handle.clone(), state, Vec::new(), self.phantom_nonce)
            .encode()
            .map_err(|e| anyhow!("failed to encode heartbeat: {e}"))?;
        self.group.inject(&frame);
        Ok(())
    }
}

/// Handle for a peer that is simulated by injected heartbeats.
#[must_use]
pub fn phantom(type_id: u16, instance_id: u64) -> ModuleHandle {
    ModuleHandle::new(ModuleUniqueId::new(type_id, instance_id), 1, "Phantom").with_endpoints(
        TransportEndpoints::new(
            format!("phantom://{type_id}-{instance_id}/pub"),
            format!("phantom://{type_id}-{instance_id}/req"),
        ),
    )
}
