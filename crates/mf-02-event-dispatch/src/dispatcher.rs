//! # Event Dispatcher
//!
//! ```text
//! transport threads                      delivery thread (mf-delivery)
//! ─────────────────                      ─────────────────────────────
//! on_event_received ──┐
//! on_request_received ┼─ admit ─► DeliveryQueue ─► lock module ─► callbacks
//! on_peer_state_change┘ (bypass)        (FIFO)      (if enabled)
//!
//! on_request_received(system topic) ─► ack + LifecycleControl   (no queue)
//! on_reply_received ─► OutstandingRequests::resolve             (no queue)
//! ```
//!
//! The delivery thread is the only caller of module code besides the
//! coordinator's enable/disable, and both take the module's lock, so module
//! callbacks never overlap.
//!
//! Events and requests are stamped with the enable cycle they were admitted
//! in. Anything that reaches the queue after `on_disable` carries an old
//! cycle and is discarded by the next delivery thread.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use shared_bus::{ExternalRequestIdentity, InboundSink, MessageTransport};
use shared_types::{Message, MessageType, ModuleHandle, ModuleLifecycleState, ModuleUniqueId};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::DispatchConfig;
use crate::errors::{DispatchError, RequestError};
use crate::handlers::{EventHandler, LifecycleControl, SharedModule};
use crate::queue::{Delivery, DeliveryQueue};
use crate::reply::{InReply, OutReply, OutstandingRequests};
use crate::subscriptions::{SubscriptionHandle, SubscriptionTable};
use crate::system::{self, SystemCommand};

/// Event Dispatch Engine for one module instance.
///
/// Created with [`EventDispatcher::new`], bound with `start`, and switched
/// on and off with `on_enable`/`on_disable` as the module enables and
/// disables.
pub struct EventDispatcher {
    self_ref: Weak<EventDispatcher>,
    module: SharedModule,
    transport: Arc<dyn MessageTransport>,
    control: Arc<dyn LifecycleControl>,
    config: DispatchConfig,

    started: AtomicBool,
    /// True while the delivery thread runs.
    alive: AtomicBool,
    /// Bumped by every `on_disable` once the delivery thread is gone.
    enable_cycle: AtomicU64,
    self_handle: RwLock<Option<ModuleHandle>>,

    queue: DeliveryQueue,
    consumer: Mutex<Option<JoinHandle<()>>>,
    subscriptions: SubscriptionTable,
    outstanding: OutstandingRequests,
    /// Inbound requests that may still be answered.
    inbound_requests: Mutex<HashSet<ExternalRequestIdentity>>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(
        module: SharedModule,
        transport: Arc<dyn MessageTransport>,
        control: Arc<dyn LifecycleControl>,
        config: DispatchConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            module,
            transport,
            control,
            config,
            started: AtomicBool::new(false),
            alive: AtomicBool::new(false),
            enable_cycle: AtomicU64::new(0),
            self_handle: RwLock::new(None),
            queue: DeliveryQueue::new(),
            consumer: Mutex::new(None),
            subscriptions: SubscriptionTable::default(),
            outstanding: OutstandingRequests::default(),
            inbound_requests: Mutex::new(HashSet::new()),
        })
    }

    // =========================================================================
    // START / STOP
    // =========================================================================

    /// Bind the transport and return `self_handle` carrying the bound
    /// endpoints.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted`, or the transport's bind failure. Nothing is left
    /// bound on failure.
    pub fn start(&self, self_handle: &ModuleHandle) -> Result<ModuleHandle, DispatchError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(module = %self_handle, "Dispatcher already started");
            return Err(DispatchError::AlreadyStarted);
        }

        let sink: Weak<dyn InboundSink> = self.self_ref.clone();
        let endpoints = match self.transport.start(self_handle, sink) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                error!(module = %self_handle, error = %e, "Transport failed to start");
                return Err(e.into());
            }
        };

        let bound = self_handle.clone().with_endpoints(endpoints);
        self.transport.peer_join(&bound);
        *self.self_handle.write() = Some(bound.clone());

        info!(
            module = %bound.describe(),
            publish = %bound.endpoints.publish,
            request = %bound.endpoints.request,
            "Event dispatcher started"
        );
        Ok(bound)
    }

    /// Disable, unbind the transport and abort all outstanding requests.
    /// Idempotent.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.on_disable();
        self.transport.stop();
        self.outstanding.abort_all();
        self.inbound_requests.lock().clear();
        *self.self_handle.write() = None;
        info!("Event dispatcher stopped");
    }

    /// Start the delivery thread. No-op if it is already running.
    ///
    /// # Errors
    ///
    /// `NotRunning` before `start`, or `Spawn` if the thread cannot be
    /// created.
    pub fn on_enable(&self) -> Result<(), DispatchError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(DispatchError::NotRunning);
        }
        let mut consumer = self.consumer.lock();
        if consumer.is_some() {
            debug!("Delivery thread already running");
            return Ok(());
        }

        self.alive.store(true, Ordering::SeqCst);
        let dispatcher = self.self_ref.clone();
        let rx = self.queue.receiver();
        let handle = thread::Builder::new()
            .name("mf-delivery".to_string())
            .spawn(move || run_delivery(dispatcher, rx))
            .map_err(|e| {
                self.alive.store(false, Ordering::SeqCst);
                DispatchError::Spawn(e.to_string())
            })?;
        *consumer = Some(handle);
        debug!("Delivery thread started");
        Ok(())
    }

    /// Stop the delivery thread after it has drained what is already
    /// queued, then drop every subscription and abort outstanding requests.
    pub fn on_disable(&self) {
        self.alive.store(false, Ordering::SeqCst);

        let consumer = self.consumer.lock().take();
        if let Some(consumer) = consumer {
            self.queue.push(Delivery::Shutdown);
            if consumer.thread().id() == thread::current().id() {
                warn!("on_disable called from the delivery thread, not joining");
            } else if consumer.join().is_err() {
                error!("Delivery thread panicked");
            }
        }
        // After the join, so everything admitted so far has been delivered.
        self.enable_cycle.fetch_add(1, Ordering::SeqCst);

        let topics = self.subscriptions.drain();
        for topic in &topics {
            self.transport.unsubscribe(topic);
        }
        let aborted = self.outstanding.abort_all();
        self.inbound_requests.lock().clear();
        debug!(subscriptions = topics.len(), aborted, "Dispatcher disabled");
    }

    // =========================================================================
    // MODULE-FACING OPERATIONS
    // =========================================================================

    /// Register `handler` for every event whose topic `topic` contains.
    ///
    /// # Errors
    ///
    /// `NotRunning` unless the delivery thread is running.
    pub fn subscribe(
        &self,
        topic: MessageType,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, DispatchError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(DispatchError::NotRunning);
        }
        self.transport.subscribe(&topic);
        let handle = self.subscriptions.insert(topic, handler);
        trace!(topic = %handle.topic(), id = handle.id(), "Subscribed");
        Ok(handle)
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        match self.subscriptions.remove(handle) {
            Some(topic) => {
                self.transport.unsubscribe(&topic);
                true
            }
            None => false,
        }
    }

    /// Hand `message` to the transport. Not ordered against inbound traffic.
    ///
    /// # Errors
    ///
    /// `NotRunning` before `start`, or the transport's error.
    pub fn publish(&self, message: &Message) -> Result<(), DispatchError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(DispatchError::NotRunning);
        }
        self.transport.publish(message)?;
        Ok(())
    }

    /// Send a request to `target` and return immediately.
    ///
    /// A transport refusal does not fail the call: the returned `InReply`
    /// is already completed with the corresponding `RequestError`.
    ///
    /// # Errors
    ///
    /// `NotRunning` unless the delivery thread is running.
    pub fn send_request(&self, target: &ModuleHandle, message: Message) -> Result<InReply, DispatchError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(DispatchError::NotRunning);
        }
        let (request_id, slot) = self.outstanding.register();
        let reply = InReply::new(request_id, slot, self.self_ref.clone());

        if let Err(e) = self.transport.send_request(target, request_id, &message) {
            debug!(target = %target.unique_id, request_id, error = %e, "Request not sent");
            self.outstanding.resolve(request_id, Err(RequestError::from_transport(e)));
        } else {
            trace!(target = %target.unique_id, request_id, topic = %message.topic, "Request sent");
        }
        Ok(reply)
    }

    /// Answer an inbound request. Only the first reply per request is sent;
    /// later ones, and replies to forgotten requests, are ignored.
    pub fn send_reply(&self, identity: &ExternalRequestIdentity, message: &Message) {
        if !self.inbound_requests.lock().remove(identity) {
            trace!(sender = %identity.sender, message_id = identity.message_id, "Reply to unknown request ignored");
            return;
        }
        if let Err(e) = self.transport.send_reply(identity, message) {
            warn!(sender = %identity.sender, error = %e, "Failed to send reply");
        }
    }

    /// Forget outstanding request `request_id`; a later reply is ignored.
    /// Returns `true` if it was still pending.
    pub fn cancel_request(&self, request_id: u64) -> bool {
        let cancelled = self.outstanding.resolve(request_id, Err(RequestError::Cancelled));
        self.transport.cancel_request(request_id);
        cancelled
    }

    /// Report a peer transition: adjust the transport's peer channels and
    /// queue the change for the module. Never dropped or blocked.
    pub fn on_peer_state_change(
        &self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        last_state: ModuleLifecycleState,
    ) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        if last_state == ModuleLifecycleState::Dead {
            self.transport.peer_join(peer);
        } else if new_state == ModuleLifecycleState::Dead {
            self.transport.peer_leave(peer);
        }
        self.queue.push(Delivery::PeerChange {
            peer: peer.clone(),
            new_state,
            last_state,
        });
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// True while the delivery thread runs.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Self handle with bound endpoints, once started.
    #[must_use]
    pub fn self_handle(&self) -> Option<ModuleHandle> {
        self.self_handle.read().clone()
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Inbound events and requests discarded by the overflow policy.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped()
    }

    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    fn forget_request(&self, identity: &ExternalRequestIdentity) {
        self.inbound_requests.lock().remove(identity);
    }

    /// Admitted before the last `on_disable`.
    fn is_stale(&self, item: &Delivery) -> bool {
        match item {
            Delivery::Event { cycle, .. } | Delivery::Request { cycle, .. } => {
                *cycle != self.enable_cycle.load(Ordering::SeqCst)
            }
            Delivery::PeerChange { .. } | Delivery::Shutdown => false,
        }
    }

    fn handle_system_request(&self, identity: &ExternalRequestIdentity, message: &Message) {
        let command = message.payload.first().copied().and_then(SystemCommand::from_code);
        let Some(command) = command else {
            warn!(sender = %identity.sender, payload = ?message.payload, "Unknown system message");
            if let Err(e) = self.transport.send_reply(identity, &system::unknown_command_reply()) {
                warn!(sender = %identity.sender, error = %e, "Failed to answer system message");
            }
            return;
        };

        info!(sender = %identity.sender, command = ?command, "System request received");
        if let Err(e) = self.transport.send_reply(identity, &command.ack()) {
            warn!(sender = %identity.sender, error = %e, "Failed to acknowledge system message");
        }
        match command {
            SystemCommand::Enable => self.control.request_enable_module(),
            SystemCommand::Disable => self.control.request_disable_module(),
            SystemCommand::Stop => self.control.request_stop_instance(),
        }
    }

    fn deliver(&self, item: Delivery) {
        if self.is_stale(&item) {
            trace!(item = ?item, "Delivery from an earlier enable cycle dropped");
            if let Delivery::Request { identity, .. } = &item {
                self.forget_request(identity);
            }
            return;
        }

        let mut module = self.module.lock();
        if !module.is_enabled() {
            trace!(item = ?item, "Module not enabled, dropping delivery");
            if let Delivery::Request { identity, .. } = &item {
                self.forget_request(identity);
            }
            return;
        }

        match item {
            Delivery::Event { message, sender, .. } => {
                for handler in self.subscriptions.matching(&message.topic) {
                    let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle_event(&message, sender)));
                    if outcome.is_err() {
                        error!(topic = %message.topic, sender = %sender, "Event handler panicked");
                    }
                }
            }
            Delivery::Request { identity, message, .. } => {
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| module.handle_request(&message, identity.sender)));
                drop(module);
                match outcome {
                    Ok(OutReply::Immediate(reply)) => self.send_reply(&identity, &reply),
                    Ok(OutReply::Future(future)) => future.bind(self.self_ref.clone(), identity),
                    Ok(OutReply::NoReply) => self.forget_request(&identity),
                    Err(_) => {
                        error!(topic = %message.topic, sender = %identity.sender, "Request handler panicked");
                        self.forget_request(&identity);
                    }
                }
            }
            Delivery::PeerChange {
                peer,
                new_state,
                last_state,
            } => {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    module.handle_module_state_change(&peer, new_state, last_state);
                }));
                if outcome.is_err() {
                    error!(peer = %peer.unique_id, "State change handler panicked");
                }
            }
            Delivery::Shutdown => {}
        }
    }
}

impl InboundSink for EventDispatcher {
    fn on_event_received(&self, message: Message, sender: ModuleUniqueId) {
        let cycle = self.enable_cycle.load(Ordering::SeqCst);
        if !self.alive.load(Ordering::SeqCst) {
            trace!(topic = %message.topic, "Dispatcher not alive, event ignored");
            return;
        }
        if self.queue.admit(&self.config, &self.alive) {
            self.queue.push_admitted(Delivery::Event { message, sender, cycle });
        }
    }

    fn on_request_received(&self, identity: ExternalRequestIdentity, message: Message) {
        if system::is_system_request(&message) {
            self.handle_system_request(&identity, &message);
            return;
        }
        let cycle = self.enable_cycle.load(Ordering::SeqCst);
        if !self.alive.load(Ordering::SeqCst) {
            trace!(sender = %identity.sender, "Dispatcher not alive, request ignored");
            return;
        }
        if self.queue.admit(&self.config, &self.alive) {
            self.inbound_requests.lock().insert(identity.clone());
            self.queue.push_admitted(Delivery::Request {
                identity,
                message,
                cycle,
            });
        }
    }

    fn on_reply_received(&self, request_id: u64, message: Message) {
        if !self.outstanding.resolve(request_id, Ok(message)) {
            trace!(request_id, "Reply for cancelled or unknown request ignored");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the `mf-delivery` thread.
fn run_delivery(dispatcher: Weak<EventDispatcher>, rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>) {
    let mut rx = rx.lock();
    while let Some(item) = rx.blocking_recv() {
        let Some(dispatcher) = dispatcher.upgrade() else {
            break;
        };
        dispatcher.queue.taken();
        if matches!(item, Delivery::Shutdown) {
            break;
        }
        dispatcher.deliver(item);
    }
    trace!("Delivery thread exiting");
}
