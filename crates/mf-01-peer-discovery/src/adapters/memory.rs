//! # In-Memory Multicast Group
//!
//! A process-local stand-in for the UDP multicast group. Each endpoint has a
//! mailbox; `send` copies a frame into every joined mailbox, the sender's
//! own included, mirroring multicast loopback.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::domain::HeartbeatTransportError;
use crate::ports::HeartbeatTransport;

#[derive(Default)]
struct MailboxState {
    frames: VecDeque<Vec<u8>>,
    joined: bool,
}

#[derive(Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
    cond: Condvar,
}

impl Mailbox {
    fn push(&self, frame: &[u8]) {
        let mut state = self.state.lock();
        if state.joined {
            state.frames.push_back(frame.to_vec());
            self.cond.notify_one();
        }
    }
}

#[derive(Default)]
struct GroupInner {
    members: Mutex<Vec<Weak<Mailbox>>>,
}

impl GroupInner {
    fn fan_out(&self, frame: &[u8]) {
        let mut members = self.members.lock();
        members.retain(|m| m.strong_count() > 0);
        for mailbox in members.iter().filter_map(Weak::upgrade) {
            mailbox.push(frame);
        }
    }
}

/// A multicast group shared by many `InMemoryHeartbeatTransport`s.
#[derive(Clone, Default)]
pub struct InMemoryMulticastGroup {
    inner: Arc<GroupInner>,
}

impl InMemoryMulticastGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new, unjoined member of this group.
    #[must_use]
    pub fn endpoint(&self) -> Arc<InMemoryHeartbeatTransport> {
        let mailbox = Arc::new(Mailbox::default());
        self.inner.members.lock().push(Arc::downgrade(&mailbox));
        Arc::new(InMemoryHeartbeatTransport {
            group: Arc::clone(&self.inner),
            mailbox,
        })
    }

    /// Deliver a raw frame to every joined member, as if a peer outside
    /// this process had sent it.
    pub fn inject(&self, frame: &[u8]) {
        self.inner.fan_out(frame);
    }
}

/// One member of an `InMemoryMulticastGroup`.
pub struct InMemoryHeartbeatTransport {
    group: Arc<GroupInner>,
    mailbox: Arc<Mailbox>,
}

impl HeartbeatTransport for InMemoryHeartbeatTransport {
    fn join(&self) -> Result<(), HeartbeatTransportError> {
        self.mailbox.state.lock().joined = true;
        Ok(())
    }

    fn leave(&self) {
        let mut state = self.mailbox.state.lock();
        state.joined = false;
        state.frames.clear();
        self.mailbox.cond.notify_all();
    }

    fn send(&self, frame: &[u8]) -> Result<(), HeartbeatTransportError> {
        if !self.mailbox.state.lock().joined {
            return Err(HeartbeatTransportError::NotJoined);
        }
        self.group.fan_out(frame);
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, HeartbeatTransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.mailbox.state.lock();
        loop {
            if !state.joined {
                return Err(HeartbeatTransportError::NotJoined);
            }
            if let Some(frame) = state.frames.pop_front() {
                return Ok(Some(frame));
            }
            if self.mailbox.cond.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.frames.pop_front());
            }
        }
    }
}
