//! # In-Memory Message Bus
//!
//! Connects module instances living in the same process. Each started
//! transport owns an endpoint with an inbound channel and a router thread
//! that hands traffic to the endpoint's `InboundSink` in arrival order.
//!
//! Suitable for tests and single-process deployments; networked deployments
//! plug a socket-based `MessageTransport` in instead.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use shared_types::{Message, MessageType, ModuleHandle, ModuleUniqueId, TransportEndpoints};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::transport::{ExternalRequestIdentity, InboundSink, MessageTransport, TransportError};

/// Traffic queued for an endpoint's router thread.
enum Inbound {
    Event {
        message: Message,
        sender: ModuleUniqueId,
    },
    Request {
        identity: ExternalRequestIdentity,
        message: Message,
    },
    Reply {
        request_id: u64,
        message: Message,
    },
}

/// Bus-side view of a started endpoint, keyed by its request address.
struct Route {
    tx: mpsc::UnboundedSender<Inbound>,
    /// Publish addresses this endpoint receives events from.
    joined: HashSet<String>,
    /// Subscribed topics with their subscribe counts.
    topics: HashMap<MessageType, usize>,
}

impl Route {
    fn wants(&self, publisher: &str, topic: &MessageType) -> bool {
        self.joined.contains(publisher) && self.topics.keys().any(|t| t.contains(topic))
    }
}

#[derive(Default)]
struct BusInner {
    routes: RwLock<HashMap<String, Route>>,
    next_endpoint: AtomicU64,
}

// ============================================================================
// InMemoryMessageBus
// ============================================================================

/// A process-local switchboard shared by many `InMemoryTransport`s.
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    inner: Arc<BusInner>,
}

impl InMemoryMessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unstarted transport attached to this bus.
    #[must_use]
    pub fn transport(&self) -> Arc<InMemoryTransport> {
        Arc::new(InMemoryTransport {
            bus: Arc::clone(&self.inner),
            local: Mutex::new(None),
        })
    }

    /// Number of started endpoints.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.inner.routes.read().len()
    }
}

// ============================================================================
// InMemoryTransport
// ============================================================================

struct LocalEndpoint {
    self_id: ModuleUniqueId,
    endpoints: TransportEndpoints,
    /// Request addresses of joined peers.
    known_targets: HashSet<String>,
    router: Option<JoinHandle<()>>,
}

/// One module instance's attachment to an `InMemoryMessageBus`.
pub struct InMemoryTransport {
    bus: Arc<BusInner>,
    local: Mutex<Option<LocalEndpoint>>,
}

impl InMemoryTransport {
    fn with_route<R>(&self, f: impl FnOnce(&mut Route) -> R) -> Option<R> {
        let local = self.local.lock();
        let key = &local.as_ref()?.endpoints.request;
        let mut routes = self.bus.routes.write();
        routes.get_mut(key).map(f)
    }

    fn deliver(&self, address: &str, item: Inbound) -> Result<(), TransportError> {
        let routes = self.bus.routes.read();
        let route = routes
            .get(address)
            .ok_or_else(|| TransportError::Unreachable(address.to_string()))?;
        route
            .tx
            .send(item)
            .map_err(|_| TransportError::Unreachable(address.to_string()))
    }
}

impl MessageTransport for InMemoryTransport {
    fn start(
        &self,
        self_handle: &ModuleHandle,
        sink: Weak<dyn InboundSink>,
    ) -> Result<TransportEndpoints, TransportError> {
        let mut local = self.local.lock();
        if local.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let n = self.bus.next_endpoint.fetch_add(1, Ordering::Relaxed);
        let endpoints = TransportEndpoints::new(format!("mem://{n}/pub"), format!("mem://{n}/req"));
        let (tx, rx) = mpsc::unbounded_channel();

        let router = thread::Builder::new()
            .name(format!("mf-bus-{n}"))
            .spawn(move || route_inbound(rx, sink))
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        self.bus.routes.write().insert(
            endpoints.request.clone(),
            Route {
                tx,
                joined: HashSet::new(),
                topics: HashMap::new(),
            },
        );

        debug!(module = %self_handle.unique_id, endpoint = %endpoints.request, "Bus endpoint bound");
        *local = Some(LocalEndpoint {
            self_id: self_handle.unique_id,
            endpoints: endpoints.clone(),
            known_targets: HashSet::new(),
            router: Some(router),
        });
        Ok(endpoints)
    }

    fn stop(&self) {
        let Some(mut local) = self.local.lock().take() else {
            return;
        };
        // Dropping the route's sender lets the router drain and exit.
        self.bus.routes.write().remove(&local.endpoints.request);
        if let Some(router) = local.router.take() {
            if router.thread().id() != thread::current().id() && router.join().is_err() {
                warn!(module = %local.self_id, "Bus router thread panicked");
            }
        }
        debug!(module = %local.self_id, "Bus endpoint closed");
    }

    fn peer_join(&self, peer: &ModuleHandle) {
        {
            let mut local = self.local.lock();
            let Some(local) = local.as_mut() else {
                return;
            };
            local.known_targets.insert(peer.endpoints.request.clone());
        }
        self.with_route(|route| route.joined.insert(peer.endpoints.publish.clone()));
        trace!(peer = %peer.unique_id, "Bus peer joined");
    }

    fn peer_leave(&self, peer: &ModuleHandle) {
        {
            let mut local = self.local.lock();
            let Some(local) = local.as_mut() else {
                return;
            };
            local.known_targets.remove(&peer.endpoints.request);
        }
        self.with_route(|route| route.joined.remove(&peer.endpoints.publish));
        trace!(peer = %peer.unique_id, "Bus peer left");
    }

    fn subscribe(&self, topic: &MessageType) {
        self.with_route(|route| *route.topics.entry(topic.clone()).or_insert(0) += 1);
    }

    fn unsubscribe(&self, topic: &MessageType) {
        self.with_route(|route| {
            if let Some(count) = route.topics.get_mut(topic) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    route.topics.remove(topic);
                }
            }
        });
    }

    fn publish(&self, message: &Message) -> Result<(), TransportError> {
        let (sender, publisher) = {
            let local = self.local.lock();
            let local = local.as_ref().ok_or(TransportError::NotStarted)?;
            (local.self_id, local.endpoints.publish.clone())
        };

        let routes = self.bus.routes.read();
        let mut receivers = 0usize;
        for route in routes.values().filter(|r| r.wants(&publisher, &message.topic)) {
            let item = Inbound::Event {
                message: message.clone(),
                sender,
            };
            if route.tx.send(item).is_ok() {
                receivers += 1;
            }
        }
        trace!(topic = %message.topic, receivers, "Event published");
        Ok(())
    }

    fn send_request(
        &self,
        target: &ModuleHandle,
        request_id: u64,
        message: &Message,
    ) -> Result<(), TransportError> {
        let identity = {
            let local = self.local.lock();
            let local = local.as_ref().ok_or(TransportError::NotStarted)?;
            if !local.known_targets.contains(&target.endpoints.request) {
                return Err(TransportError::UnknownPeer(target.unique_id));
            }
            ExternalRequestIdentity {
                sender: local.self_id,
                message_id: request_id,
                reply_route: local.endpoints.request.clone(),
            }
        };
        self.deliver(
            &target.endpoints.request,
            Inbound::Request {
                identity,
                message: message.clone(),
            },
        )
    }

    fn send_reply(
        &self,
        identity: &ExternalRequestIdentity,
        message: &Message,
    ) -> Result<(), TransportError> {
        if self.local.lock().is_none() {
            return Err(TransportError::NotStarted);
        }
        self.deliver(
            &identity.reply_route,
            Inbound::Reply {
                request_id: identity.message_id,
                message: message.clone(),
            },
        )
    }

    fn cancel_request(&self, request_id: u64) {
        // Nothing is held per request on this transport.
        trace!(request_id, "Request cancelled");
    }
}

impl Drop for InMemoryTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

fn route_inbound(mut rx: mpsc::UnboundedReceiver<Inbound>, sink: Weak<dyn InboundSink>) {
    while let Some(item) = rx.blocking_recv() {
        let Some(sink) = sink.upgrade() else {
            trace!("Inbound sink gone, discarding traffic");
            continue;
        };
        match item {
            Inbound::Event { message, sender } => sink.on_event_received(message, sender),
            Inbound::Request { identity, message } => sink.on_request_received(identity, message),
            Inbound::Reply {
                request_id,
                message,
            } => sink.on_reply_received(request_id, message),
        }
    }
}
