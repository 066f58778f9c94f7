//! # Transport Port
//!
//! The narrow interface between the event dispatch engine and whatever moves
//! bytes between module instances.

use std::sync::Weak;

use shared_types::{Message, MessageType, ModuleHandle, ModuleUniqueId, TransportEndpoints};
use thiserror::Error;

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// `start` was called on a running transport.
    #[error("Transport already started")]
    AlreadyStarted,

    /// The transport is not running.
    #[error("Transport not started")]
    NotStarted,

    /// The target was never joined as a peer.
    #[error("Unknown peer {0}")]
    UnknownPeer(ModuleUniqueId),

    /// The target's endpoint is gone.
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    /// Binding the local endpoints failed.
    #[error("Bind failed: {0}")]
    BindFailed(String),
}

/// Identifies an inbound request awaiting a reply.
///
/// `reply_route` is private to the transport and tells it where the reply
/// must go.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalRequestIdentity {
    pub sender: ModuleUniqueId,
    pub message_id: u64,
    pub reply_route: String,
}

/// Receives traffic arriving at a started transport.
///
/// Called from transport-owned threads; implementations must not block for
/// long.
pub trait InboundSink: Send + Sync {
    /// A published event from `sender` matched one of our subscriptions.
    fn on_event_received(&self, message: Message, sender: ModuleUniqueId);

    /// A peer sent us a request.
    fn on_request_received(&self, identity: ExternalRequestIdentity, message: Message);

    /// A reply to one of our requests arrived.
    fn on_reply_received(&self, request_id: u64, message: Message);
}

/// Pub/sub and request/reply transport.
pub trait MessageTransport: Send + Sync {
    /// Bind local endpoints and begin delivering to `sink`.
    ///
    /// The sink is held weakly; traffic arriving after it is dropped is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Fails if already started or if binding fails.
    fn start(
        &self,
        self_handle: &ModuleHandle,
        sink: Weak<dyn InboundSink>,
    ) -> Result<TransportEndpoints, TransportError>;

    /// Unbind and stop delivering. Idempotent.
    fn stop(&self);

    /// Start receiving `peer`'s events and allow requests to it.
    fn peer_join(&self, peer: &ModuleHandle);

    /// Stop receiving `peer`'s events.
    fn peer_leave(&self, peer: &ModuleHandle);

    fn subscribe(&self, topic: &MessageType);

    /// Remove one earlier `subscribe` of `topic`.
    fn unsubscribe(&self, topic: &MessageType);

    /// # Errors
    ///
    /// Fails if the transport is not running.
    fn publish(&self, message: &Message) -> Result<(), TransportError>;

    /// # Errors
    ///
    /// Fails if the transport is not running or `target` is not reachable.
    fn send_request(
        &self,
        target: &ModuleHandle,
        request_id: u64,
        message: &Message,
    ) -> Result<(), TransportError>;

    /// # Errors
    ///
    /// Fails if the transport is not running or the requester is gone.
    fn send_reply(
        &self,
        identity: &ExternalRequestIdentity,
        message: &Message,
    ) -> Result<(), TransportError>;

    /// Forget any transport-side state for `request_id`.
    fn cancel_request(&self, request_id: u64);
}
