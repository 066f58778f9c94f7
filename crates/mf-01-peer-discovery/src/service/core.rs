use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use shared_types::{ModuleHandle, ModuleLifecycleState, ModuleUniqueId, StopSignal};
use tracing::{debug, info, warn};

use crate::domain::{DiscoveryError, HeartbeatFrame, PeerRegistry};
use crate::ports::{HeartbeatTransport, PeerStateListener};
use crate::service::config::DiscoveryConfig;
use crate::service::maintenance;

/// What we currently advertise about ourselves.
pub(crate) struct SelfAdvert {
    pub(crate) handle: Option<ModuleHandle>,
    pub(crate) state: ModuleLifecycleState,
    pub(crate) additional_state: Vec<u8>,
}

/// Parameters fixed for one start/stop run.
pub(crate) struct Session {
    pub(crate) self_id: ModuleUniqueId,
    pub(crate) config: DiscoveryConfig,
    pub(crate) listener: Arc<dyn PeerStateListener>,
}

impl Session {
    pub(crate) fn notify(
        &self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        last_state: ModuleLifecycleState,
    ) {
        debug!(peer = %peer.unique_id, from = %last_state, to = %new_state, "Peer state change");
        self.listener.on_peer_state_change(peer, new_state, last_state);
    }
}

pub(crate) struct DiscoveryInner {
    pub(crate) registry: Arc<PeerRegistry>,
    pub(crate) transport: Arc<dyn HeartbeatTransport>,
    pub(crate) nonce: u32,
    pub(crate) started: AtomicBool,
    pub(crate) stop: StopSignal,
    pub(crate) advert: Mutex<SelfAdvert>,
    /// Held across a registry mutation and the callback reporting it.
    pub(crate) membership: Mutex<()>,
}

impl DiscoveryInner {
    /// Send one heartbeat with the current advert.
    pub(crate) fn broadcast(&self) {
        let advert = self.advert.lock();
        let Some(handle) = advert.handle.clone() else {
            return;
        };
        let frame = HeartbeatFrame::new(
            handle,
            advert.state,
            advert.additional_state.clone(),
            self.nonce,
        );
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode heartbeat");
                return;
            }
        };
        if let Err(e) = self.transport.send(&bytes) {
            warn!(error = %e, "Failed to send heartbeat");
        }
    }
}

/// Peer Discovery Service.
///
/// Runs a send loop (heartbeat + timeout sweep) and a receive loop
/// (heartbeat ingestion) on dedicated threads, maintaining the shared
/// `PeerRegistry` and reporting every peer transition to a
/// `PeerStateListener`.
///
/// # Example
///
/// ```rust,ignore
/// let group = InMemoryMulticastGroup::new();
/// let registry = Arc::new(PeerRegistry::new());
/// let discovery = PeerDiscoveryService::new(Arc::clone(&registry), group.endpoint());
///
/// discovery.start(self_handle, listener, DiscoveryConfig::default())?;
/// discovery.update_self_state(ModuleLifecycleState::Inactive);
/// discovery.send_state_multicast();
/// ```
pub struct PeerDiscoveryService {
    inner: Arc<DiscoveryInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerDiscoveryService {
    /// Create a stopped engine with a fresh random nonce.
    #[must_use]
    pub fn new(registry: Arc<PeerRegistry>, transport: Arc<dyn HeartbeatTransport>) -> Self {
        Self {
            inner: Arc::new(DiscoveryInner {
                registry,
                transport,
                nonce: rand::random(),
                started: AtomicBool::new(false),
                stop: StopSignal::new(),
                advert: Mutex::new(SelfAdvert {
                    handle: None,
                    state: ModuleLifecycleState::Dead,
                    additional_state: Vec::new(),
                }),
                membership: Mutex::new(()),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Join the group and launch the send and receive loops.
    ///
    /// With `wait_for_discovery`, blocks for two broadcast intervals so the
    /// registry is populated before returning.
    ///
    /// # Errors
    ///
    /// Fails if already started, if the group cannot be joined, or if a
    /// worker cannot be spawned. Nothing is left running on failure.
    pub fn start(
        &self,
        self_handle: ModuleHandle,
        listener: Arc<dyn PeerStateListener>,
        config: DiscoveryConfig,
    ) -> Result<(), DiscoveryError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(DiscoveryError::AlreadyStarted);
        }
        self.inner.stop.reset();

        if let Err(e) = self.inner.transport.join() {
            self.inner.started.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let session = Arc::new(Session {
            self_id: self_handle.unique_id,
            config,
            listener,
        });
        self.inner.advert.lock().handle = Some(self_handle.clone());

        let spawned = self
            .spawn("mf-discovery-send", &session, maintenance::run_send_loop)
            .and_then(|()| self.spawn("mf-discovery-recv", &session, maintenance::run_receive_loop));
        if let Err(e) = spawned {
            self.stop();
            return Err(e);
        }

        info!(
            module = %self_handle.describe(),
            nonce = self.inner.nonce,
            interval_ms = config.broadcast_interval.as_millis() as u64,
            "Peer discovery started"
        );

        if config.wait_for_discovery {
            self.inner.stop.wait_timeout(config.broadcast_interval * 2);
        }
        Ok(())
    }

    fn spawn(
        &self,
        name: &str,
        session: &Arc<Session>,
        body: fn(Arc<DiscoveryInner>, Arc<Session>),
    ) -> Result<(), DiscoveryError> {
        let inner = Arc::clone(&self.inner);
        let session = Arc::clone(session);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(inner, session))
            .map_err(|e| DiscoveryError::Spawn(e.to_string()))?;
        self.workers.lock().push(handle);
        Ok(())
    }

    /// Signal both loops, leave the group and join the workers. Idempotent.
    pub fn stop(&self) {
        if !self.inner.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.stop.signal();
        self.inner.transport.leave();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() != current && worker.join().is_err() {
                warn!("Discovery worker panicked");
            }
        }
        info!("Peer discovery stopped");
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Set the advertised lifecycle state. Takes effect with the next
    /// heartbeat.
    pub fn update_self_state(&self, state: ModuleLifecycleState) {
        self.inner.advert.lock().state = state;
    }

    /// Set the advertised additional state. Takes effect with the next
    /// heartbeat.
    pub fn update_self_additional_state(&self, additional_state: Vec<u8>) {
        self.inner.advert.lock().additional_state = additional_state;
    }

    /// Send one heartbeat now. No-op while stopped.
    pub fn send_state_multicast(&self) {
        if !self.is_started() {
            return;
        }
        self.inner.broadcast();
    }

    #[must_use]
    pub fn self_state(&self) -> ModuleLifecycleState {
        self.inner.advert.lock().state
    }

    #[must_use]
    pub fn registry(&self) -> Arc<PeerRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// This process's heartbeat nonce.
    #[must_use]
    pub fn nonce(&self) -> u32 {
        self.inner.nonce
    }
}

impl Drop for PeerDiscoveryService {
    fn drop(&mut self) {
        self.stop();
    }
}
