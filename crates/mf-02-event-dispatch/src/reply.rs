//! # Request/Reply Correlation
//!
//! ```text
//! Outbound request:
//!   1. send_request allocates the next request id (first id is 1)
//!   2. A ReplySlot is stored in the outstanding map under that id
//!   3. The caller receives an InReply holding the same slot
//!   4. on_reply_received removes the id and completes the slot
//!
//! Cancellation:
//!   cancel() removes the id first; a reply arriving later finds nothing
//!   and is ignored. Dropping an unfinished InReply cancels it.
//!
//! Inbound request:
//!   The module answers with OutReply::Immediate, OutReply::Future (a
//!   FutureReply the module completes later, at most once), or
//!   OutReply::NoReply.
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use shared_bus::ExternalRequestIdentity;
use shared_types::Message;
use tracing::trace;

use crate::dispatcher::EventDispatcher;
use crate::errors::RequestError;

// =============================================================================
// REPLY SLOT
// =============================================================================

/// Completion cell shared by the outstanding map and the `InReply`.
#[derive(Default)]
pub(crate) struct ReplySlot {
    outcome: Mutex<Option<Result<Message, RequestError>>>,
    cond: Condvar,
}

impl ReplySlot {
    /// Record the outcome. Only the first call has any effect.
    pub(crate) fn finish(&self, outcome: Result<Message, RequestError>) -> bool {
        let mut slot = self.outcome.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.cond.notify_all();
        true
    }

    fn is_done(&self) -> bool {
        self.outcome.lock().is_some()
    }

    fn wait(&self, deadline: Option<Instant>) -> Result<Message, RequestError> {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut slot, deadline).timed_out() {
                        return slot.clone().unwrap_or(Err(RequestError::Timeout));
                    }
                }
                None => self.cond.wait(&mut slot),
            }
        }
    }
}

// =============================================================================
// OUTSTANDING REQUESTS
// =============================================================================

/// Requests sent by this dispatcher that still await a reply.
#[derive(Default)]
pub(crate) struct OutstandingRequests {
    last_id: AtomicU64,
    pending: Mutex<HashMap<u64, Arc<ReplySlot>>>,
}

impl OutstandingRequests {
    pub(crate) fn register(&self) -> (u64, Arc<ReplySlot>) {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = Arc::new(ReplySlot::default());
        self.pending.lock().insert(id, Arc::clone(&slot));
        (id, slot)
    }

    /// Complete `id` with `outcome`. Returns `false` if `id` is not
    /// outstanding (cancelled, already answered, or never sent).
    pub(crate) fn resolve(&self, id: u64, outcome: Result<Message, RequestError>) -> bool {
        let Some(slot) = self.pending.lock().remove(&id) else {
            return false;
        };
        slot.finish(outcome)
    }

    /// Fail every outstanding request with `RequestError::Aborted`.
    pub(crate) fn abort_all(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, slot) in &drained {
            slot.finish(Err(RequestError::Aborted));
        }
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

// =============================================================================
// IN REPLY
// =============================================================================

/// Handle to a request awaiting its reply.
///
/// Owned by the requester. Dropping it before completion cancels the
/// request.
pub struct InReply {
    request_id: u64,
    slot: Arc<ReplySlot>,
    dispatcher: Weak<EventDispatcher>,
}

impl InReply {
    pub(crate) fn new(request_id: u64, slot: Arc<ReplySlot>, dispatcher: Weak<EventDispatcher>) -> Self {
        Self {
            request_id,
            slot,
            dispatcher,
        }
    }

    #[must_use]
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Block until the request completes.
    ///
    /// # Errors
    ///
    /// The request was cancelled, aborted or refused by the transport.
    pub fn get(&self) -> Result<Message, RequestError> {
        self.slot.wait(None)
    }

    /// Block until the request completes or `timeout` elapses.
    ///
    /// A timeout leaves the request outstanding; a later reply still
    /// completes it.
    ///
    /// # Errors
    ///
    /// `RequestError::Timeout` if nothing arrived in time, otherwise as
    /// for `get`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Message, RequestError> {
        self.slot.wait(Some(Instant::now() + timeout))
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.slot.is_done()
    }

    /// Cancel the request. Returns `true` if it was still pending.
    pub fn cancel(&self) -> bool {
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.cancel_request(self.request_id),
            None => self.slot.finish(Err(RequestError::Cancelled)),
        }
    }
}

impl Drop for InReply {
    fn drop(&mut self) {
        if !self.slot.is_done() {
            trace!(request_id = self.request_id, "Unfinished request dropped");
            self.cancel();
        }
    }
}

impl std::fmt::Debug for InReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InReply")
            .field("request_id", &self.request_id)
            .field("done", &self.is_done())
            .finish()
    }
}

// =============================================================================
// OUT REPLY
// =============================================================================

/// How a module answers an inbound request.
#[derive(Debug)]
pub enum OutReply {
    /// Send this reply now.
    Immediate(Message),
    /// The module will reply later through the `FutureReply`.
    Future(FutureReply),
    /// No reply will be sent.
    NoReply,
}

#[derive(Debug)]
enum FutureState {
    Unbound { pending: Option<Message> },
    Bound {
        dispatcher: Weak<EventDispatcher>,
        identity: ExternalRequestIdentity,
    },
    Sent,
}

/// A reply the module sends after returning from `handle_request`.
///
/// Clone it, return one copy inside `OutReply::Future` and keep the other.
/// Calling `send` before the dispatcher has bound the request is fine: the
/// message is held and sent on binding.
#[derive(Debug, Clone)]
pub struct FutureReply {
    state: Arc<Mutex<FutureState>>,
}

impl Default for FutureReply {
    fn default() -> Self {
        Self::new()
    }
}

impl FutureReply {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FutureState::Unbound { pending: None })),
        }
    }

    /// Send the reply. Returns `false` if a reply was already sent or queued.
    pub fn send(&self, message: Message) -> bool {
        let mut state = self.state.lock();
        match &mut *state {
            FutureState::Unbound { pending } => {
                if pending.is_some() {
                    return false;
                }
                *pending = Some(message);
                true
            }
            FutureState::Bound {
                dispatcher,
                identity,
            } => {
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.send_reply(identity, &message);
                }
                *state = FutureState::Sent;
                true
            }
            FutureState::Sent => false,
        }
    }

    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(*self.state.lock(), FutureState::Sent)
    }

    /// Attach the inbound request this reply answers.
    pub(crate) fn bind(&self, dispatcher: Weak<EventDispatcher>, identity: ExternalRequestIdentity) {
        let mut state = self.state.lock();
        match &mut *state {
            FutureState::Unbound { pending } => match pending.take() {
                Some(message) => {
                    if let Some(dispatcher) = dispatcher.upgrade() {
                        dispatcher.send_reply(&identity, &message);
                    }
                    *state = FutureState::Sent;
                }
                None => {
                    *state = FutureState::Bound {
                        dispatcher,
                        identity,
                    };
                }
            },
            _ => trace!("Future reply bound twice, ignoring"),
        }
    }
}
