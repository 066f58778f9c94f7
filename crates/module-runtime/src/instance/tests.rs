//! Coordinator scenarios over the in-memory heartbeat group and message bus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mf_01_peer_discovery::{DiscoveryConfig, InMemoryMulticastGroup};
use mf_02_event_dispatch::{OutReply, RequestHandler, StateChangeHandler};
use parking_lot::Mutex;
use shared_bus::InMemoryMessageBus;
use shared_types::{
    Message, MessageType, ModuleDependency, ModuleHandle, ModuleLifecycleState, ModuleUniqueId,
    StaticConfigProvider,
};

use super::{EnabledState, ModuleInstance, StartOptions};
use crate::access::FrameworkAccess;
use crate::errors::{FrameworkError, ModuleError, StartError};
use crate::module::Module;

const INTERVAL: Duration = Duration::from_millis(20);

// =============================================================================
// FIXTURES
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum EnableBehavior {
    Succeed,
    Fail,
    Panic,
}

/// What a test module observed, shared with the test body.
#[derive(Default)]
struct Probe {
    enables: AtomicUsize,
    disables: AtomicUsize,
    framework: Mutex<Option<FrameworkAccess>>,
    events: Mutex<Vec<Vec<u8>>>,
    peer_changes: Mutex<Vec<(ModuleUniqueId, ModuleLifecycleState)>>,
}

impl Probe {
    fn framework(&self) -> FrameworkAccess {
        self.framework.lock().clone().unwrap()
    }
}

struct TestModule {
    id: ModuleUniqueId,
    version: u16,
    dependencies: Vec<ModuleDependency>,
    behavior: EnableBehavior,
    subscribe_to: Option<MessageType>,
    probe: Arc<Probe>,
}

impl TestModule {
    fn new(type_id: u16, instance_id: u64) -> (Self, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let module = Self {
            id: ModuleUniqueId::new(type_id, instance_id),
            version: 1,
            dependencies: Vec::new(),
            behavior: EnableBehavior::Succeed,
            subscribe_to: None,
            probe: Arc::clone(&probe),
        };
        (module, probe)
    }

    fn depends_on(mut self, dependency: ModuleDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    fn behaving(mut self, behavior: EnableBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn subscribing(mut self, topic: MessageType) -> Self {
        self.subscribe_to = Some(topic);
        self
    }
}

impl RequestHandler for TestModule {
    fn handle_request(&mut self, request: &Message, _sender: ModuleUniqueId) -> OutReply {
        OutReply::Immediate(request.clone())
    }
}

impl StateChangeHandler for TestModule {
    fn handle_module_state_change(
        &mut self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        _last_state: ModuleLifecycleState,
    ) {
        self.probe.peer_changes.lock().push((peer.unique_id, new_state));
    }
}

impl Module for TestModule {
    fn unique_id(&self) -> ModuleUniqueId {
        self.id
    }

    fn version(&self) -> u16 {
        self.version
    }

    fn name(&self) -> &str {
        "Probe"
    }

    fn dependencies(&self) -> Vec<ModuleDependency> {
        self.dependencies.clone()
    }

    fn enable(&mut self, framework: FrameworkAccess) -> Result<(), ModuleError> {
        match self.behavior {
            EnableBehavior::Fail => return Err(ModuleError::new("refusing to enable")),
            EnableBehavior::Panic => panic!("enable blew up"),
            EnableBehavior::Succeed => {}
        }
        if let Some(topic) = self.subscribe_to.clone() {
            let probe = Arc::clone(&self.probe);
            framework.subscribe(
                topic,
                Arc::new(move |message: &Message, _sender: ModuleUniqueId| {
                    probe.events.lock().push(message.payload.clone());
                }),
            )?;
        }
        *self.probe.framework.lock() = Some(framework);
        self.probe.enables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&mut self) {
        self.probe.framework.lock().take();
        self.probe.disables.fetch_add(1, Ordering::SeqCst);
    }
}

/// A shared heartbeat group and message bus for one scenario.
#[derive(Default)]
struct Network {
    group: InMemoryMulticastGroup,
    bus: InMemoryMessageBus,
}

impl Network {
    fn instance(&self, module: TestModule) -> ModuleInstance {
        ModuleInstance::with_discovery_config(
            module,
            Arc::new(StaticConfigProvider::new()),
            self.group.endpoint(),
            self.bus.transport(),
            DiscoveryConfig::default().with_broadcast_interval(INTERVAL),
        )
    }

    fn launch(&self, module: TestModule) -> ModuleInstance {
        let instance = self.instance(module);
        instance.start(options()).unwrap();
        instance
    }
}

fn options() -> StartOptions {
    StartOptions::default().with_wait_for_discovery(false)
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn topic(bytes: &[u8]) -> MessageType {
    MessageType::new(bytes.to_vec()).unwrap()
}

// =============================================================================
// START / STOP
// =============================================================================

#[test]
fn test_module_without_dependencies_enables_on_start() {
    let net = Network::default();
    let (module, probe) = TestModule::new(1, 0);
    let instance = net.launch(module);

    assert!(wait_until(|| instance.is_module_active()));
    assert_eq!(instance.module_state(), EnabledState::Enabled);
    assert_eq!(instance.advertised_state(), ModuleLifecycleState::Active);
    assert_eq!(probe.enables.load(Ordering::SeqCst), 1);
    assert!(!instance.self_handle().endpoints.is_unbound());

    instance.stop_instance();
}

#[test]
fn test_stop_before_start_leaves_requests_alone() {
    let net = Network::default();
    let (module, probe) = TestModule::new(1, 0);
    let instance = net.instance(module);

    instance.request_enable_module();
    instance.stop_instance();
    assert!(!instance.is_started());
    assert!(instance.is_stopped());
    let control = &instance.core.control;
    assert!(control.is(&control.enable_requested));

    instance.start(options().with_auto_enable(false)).unwrap();
    assert!(!control.is(&control.enable_requested));
    thread::sleep(INTERVAL * 3);
    assert_eq!(probe.enables.load(Ordering::SeqCst), 0);
    instance.stop_instance();
}

#[test]
fn test_start_twice_is_rejected() {
    let net = Network::default();
    let (module, _probe) = TestModule::new(1, 0);
    let instance = net.launch(module);

    assert!(matches!(instance.start(options()), Err(StartError::AlreadyStarted)));
    instance.stop_instance();
}

#[test]
fn test_stop_disables_and_advertises_dead() {
    let net = Network::default();
    let (module, probe) = TestModule::new(1, 0);
    let instance = net.launch(module);
    assert!(wait_until(|| instance.is_module_active()));
    let framework = probe.framework();

    instance.stop_instance();

    assert!(instance.is_stopped());
    assert!(!instance.is_started());
    assert!(!instance.is_module_active());
    assert_eq!(instance.module_state(), EnabledState::Disabled);
    assert_eq!(instance.advertised_state(), ModuleLifecycleState::Dead);
    assert_eq!(probe.disables.load(Ordering::SeqCst), 1);
    assert_eq!(framework.self_handle(), Err(FrameworkError::NotRunning));
    assert!(!instance.dispatcher().is_started());
}

#[test]
fn test_stop_is_idempotent_and_instance_restarts() {
    let net = Network::default();
    let (module, probe) = TestModule::new(1, 0);
    let instance = net.launch(module);
    assert!(wait_until(|| instance.is_module_active()));

    instance.stop_instance();
    instance.stop_instance();
    assert!(instance.is_stopped());

    instance.start(options()).unwrap();
    assert!(wait_until(|| instance.is_module_active()));
    assert_eq!(probe.enables.load(Ordering::SeqCst), 2);
    instance.stop_instance();
}

#[test]
fn test_auto_enable_off_waits_for_request() {
    let net = Network::default();
    let (module, probe) = TestModule::new(1, 0);
    let instance = net.instance(module);
    instance.start(options().with_auto_enable(false)).unwrap();

    thread::sleep(INTERVAL * 3);
    assert!(!instance.is_module_active());
    assert_eq!(probe.enables.load(Ordering::SeqCst), 0);

    instance.request_enable_module();
    assert!(wait_until(|| instance.is_module_active()));
    instance.stop_instance();
}

#[test]
fn test_request_disable_then_enable() {
    let net = Network::default();
    let (module, probe) = TestModule::new(1, 0);
    let instance = net.launch(module);
    assert!(wait_until(|| instance.is_module_active()));

    instance.request_disable_module();
    assert!(wait_until(|| !instance.is_module_active()));
    assert_eq!(instance.advertised_state(), ModuleLifecycleState::Inactive);
    assert!(instance.is_started());

    instance.request_enable_module();
    assert!(wait_until(|| instance.is_module_active()));
    assert_eq!(probe.enables.load(Ordering::SeqCst), 2);
    assert_eq!(probe.disables.load(Ordering::SeqCst), 1);
    instance.stop_instance();
}

#[test]
fn test_module_can_stop_its_own_instance() {
    let net = Network::default();
    let (module, probe) = TestModule::new(1, 0);
    let instance = net.launch(module);
    assert!(wait_until(|| instance.is_module_active()));

    probe.framework().request_stop_instance().unwrap();
    instance.join_execution();
    assert!(instance.is_stopped());
}

// =============================================================================
// ENABLE FAILURES
// =============================================================================

#[test]
fn test_enable_failure_stops_instance() {
    let net = Network::default();
    let (module, probe) = TestModule::new(1, 0);
    let instance = net.launch(module.behaving(EnableBehavior::Fail));

    instance.join_execution();
    assert!(instance.is_stopped());
    assert_eq!(instance.module_state(), EnabledState::Disabled);
    assert_eq!(probe.enables.load(Ordering::SeqCst), 0);
}

#[test]
fn test_enable_panic_is_contained() {
    let net = Network::default();
    let (module, _probe) = TestModule::new(1, 0);
    let instance = net.instance(module.behaving(EnableBehavior::Panic));
    instance
        .start(options().with_exit_on_enable_failure(false))
        .unwrap();

    thread::sleep(INTERVAL * 3);
    assert!(instance.is_started());
    assert!(!instance.is_module_active());
    assert_eq!(instance.advertised_state(), ModuleLifecycleState::Inactive);
    instance.stop_instance();
}

// =============================================================================
// DEPENDENCIES & UNIQUENESS
// =============================================================================

#[test]
fn test_dependency_gates_enable_and_reenable() {
    let net = Network::default();
    let (consumer, probe) = TestModule::new(1, 0);
    let consumer = net.launch(consumer.depends_on(ModuleDependency::on_type(2)));

    thread::sleep(INTERVAL * 3);
    assert!(!consumer.is_module_active());

    let (provider, _) = TestModule::new(2, 0);
    let provider = net.launch(provider);
    assert!(wait_until(|| consumer.is_module_active()));

    provider.stop_instance();
    assert!(wait_until(|| !consumer.is_module_active()));
    assert!(consumer.is_started());
    assert_eq!(probe.disables.load(Ordering::SeqCst), 1);

    let (replacement, _) = TestModule::new(2, 7);
    let replacement = net.launch(replacement);
    assert!(wait_until(|| consumer.is_module_active()));
    assert_eq!(probe.enables.load(Ordering::SeqCst), 2);

    consumer.stop_instance();
    replacement.stop_instance();
}

#[test]
fn test_version_dependency_requires_exact_match() {
    let net = Network::default();
    let (consumer, _) = TestModule::new(1, 0);
    let consumer = net.launch(consumer.depends_on(ModuleDependency::on_version(2, 3)));

    let (old, _) = TestModule::new(2, 0);
    let old = net.launch(old);
    assert!(wait_until(|| consumer.peers().contains_type(2, true)));
    thread::sleep(INTERVAL * 3);
    assert!(!consumer.is_module_active());

    let (mut current, _) = TestModule::new(2, 1);
    current.version = 3;
    let current = net.launch(current);
    assert!(wait_until(|| consumer.is_module_active()));

    consumer.stop_instance();
    old.stop_instance();
    current.stop_instance();
}

#[test]
fn test_duplicate_active_id_blocks_enable() {
    let net = Network::default();
    let (first, _) = TestModule::new(5, 0);
    let first = net.instance(first);
    first
        .start(options().with_equal_type_interconnect(true))
        .unwrap();
    assert!(wait_until(|| first.is_module_active()));

    let (second, probe) = TestModule::new(5, 0);
    let second = net.instance(second);
    second
        .start(options().with_equal_type_interconnect(true))
        .unwrap();

    assert!(wait_until(|| second.peers().contains(&ModuleUniqueId::new(5, 0), true)));
    thread::sleep(INTERVAL * 3);
    assert!(!second.is_module_active());
    assert_eq!(probe.enables.load(Ordering::SeqCst), 0);
    assert!(first.is_module_active());

    first.stop_instance();
    assert!(wait_until(|| second.is_module_active()));
    second.stop_instance();
}

#[test]
fn test_same_type_peers_ignored_when_interconnect_disabled() {
    let net = Network::default();
    let (first, _) = TestModule::new(5, 0);
    let first = net.instance(first);
    first
        .start(options().with_equal_type_interconnect(false))
        .unwrap();

    let (other, _) = TestModule::new(5, 1);
    let other = net.launch(other);
    let (stranger, _) = TestModule::new(6, 0);
    let stranger = net.launch(stranger);

    assert!(wait_until(|| first.peers().contains_type(6, false)));
    assert!(!first.peers().contains_type(5, false));

    first.stop_instance();
    other.stop_instance();
    stranger.stop_instance();
}

// =============================================================================
// FRAMEWORK ACCESS
// =============================================================================

#[test]
fn test_events_and_requests_between_instances() {
    let net = Network::default();
    let (listener, listener_probe) = TestModule::new(1, 0);
    let listener = net.launch(listener.subscribing(topic(&[9])));
    let (speaker, speaker_probe) = TestModule::new(2, 0);
    let speaker = net.launch(speaker);

    assert!(wait_until(|| listener.is_module_active() && speaker.is_module_active()));
    assert!(wait_until(|| listener.peers().contains(&ModuleUniqueId::new(2, 0), true)));
    thread::sleep(INTERVAL);

    let framework = speaker_probe.framework();
    framework
        .publish(&Message::new(topic(&[9, 1]), b"hello".to_vec()))
        .unwrap();
    framework
        .publish(&Message::new(topic(&[8]), b"ignored".to_vec()))
        .unwrap();
    assert!(wait_until(|| !listener_probe.events.lock().is_empty()));
    assert_eq!(*listener_probe.events.lock(), vec![b"hello".to_vec()]);

    let reply = framework
        .send_request(ModuleUniqueId::new(1, 0), Message::new(topic(&[3]), b"ping".to_vec()))
        .unwrap()
        .get_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.payload, b"ping".to_vec());

    let unknown = framework.send_request(ModuleUniqueId::new(42, 0), Message::new(topic(&[3]), b"x".to_vec()));
    assert!(matches!(unknown, Err(FrameworkError::UnknownPeer(_))));

    listener.stop_instance();
    speaker.stop_instance();
}

#[test]
fn test_module_observes_peer_transitions() {
    let net = Network::default();
    let (watcher, probe) = TestModule::new(1, 0);
    let watcher = net.launch(watcher);
    assert!(wait_until(|| watcher.is_module_active()));

    let (peer, _) = TestModule::new(2, 0);
    let peer = net.launch(peer);
    let peer_id = ModuleUniqueId::new(2, 0);
    assert!(wait_until(|| probe
        .peer_changes
        .lock()
        .contains(&(peer_id, ModuleLifecycleState::Active))));

    peer.stop_instance();
    assert!(wait_until(|| probe
        .peer_changes
        .lock()
        .contains(&(peer_id, ModuleLifecycleState::Dead))));

    watcher.stop_instance();
}

#[test]
fn test_additional_state_reaches_peers() {
    let net = Network::default();
    let (first, probe) = TestModule::new(1, 0);
    let first = net.launch(first);
    let (second, _) = TestModule::new(2, 0);
    let second = net.launch(second);
    assert!(wait_until(|| first.is_module_active()));

    let framework = probe.framework();
    framework.update_additional_state(vec![4, 2]).unwrap();
    framework.force_state_broadcast().unwrap();

    let first_id = ModuleUniqueId::new(1, 0);
    assert!(wait_until(|| second.peers().additional_state_of(&first_id) == Some(vec![4, 2])));

    first.stop_instance();
    second.stop_instance();
}

#[test]
fn test_remote_lifecycle_control() {
    let net = Network::default();
    let (controller, probe) = TestModule::new(1, 0);
    let controller = net.launch(controller);
    let (target, _) = TestModule::new(2, 0);
    let target = net.launch(target);
    let target_id = ModuleUniqueId::new(2, 0);

    assert!(wait_until(|| controller.is_module_active() && target.is_module_active()));
    assert!(wait_until(|| controller.peers().contains(&target_id, true)));
    let framework = probe.framework();
    let timeout = Duration::from_secs(2);

    assert!(framework.request_disable_remote_instance(target_id, timeout));
    assert!(wait_until(|| !target.is_module_active()));

    assert!(framework.request_enable_remote_instance(target_id, timeout));
    assert!(wait_until(|| target.is_module_active()));

    assert!(framework.request_stop_remote_instance(target_id, timeout));
    target.join_execution();
    assert!(target.is_stopped());

    assert!(!framework.request_stop_remote_instance(ModuleUniqueId::new(42, 0), timeout));
    controller.stop_instance();
}
