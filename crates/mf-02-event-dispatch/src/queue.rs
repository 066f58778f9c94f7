//! Delivery queue between transport threads and the delivery thread.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use shared_bus::ExternalRequestIdentity;
use shared_types::{Message, ModuleHandle, ModuleLifecycleState, ModuleUniqueId};
use tokio::sync::mpsc;
use tracing::trace;

use crate::config::{DispatchConfig, OverflowPolicy};

/// One unit of work for the delivery thread.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// `cycle` is the enable cycle the event was admitted in.
    Event {
        message: Message,
        sender: ModuleUniqueId,
        cycle: u64,
    },
    Request {
        identity: ExternalRequestIdentity,
        message: Message,
        cycle: u64,
    },
    PeerChange {
        peer: ModuleHandle,
        new_state: ModuleLifecycleState,
        last_state: ModuleLifecycleState,
    },
    /// Ends the delivery thread after everything queued before it.
    Shutdown,
}

/// FIFO of pending deliveries with a length counter for backpressure.
pub(crate) struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    /// Locked by the delivery thread for its whole run.
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
    len: AtomicUsize,
    dropped: AtomicU64,
}

impl DeliveryQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            len: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn receiver(&self) -> Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>> {
        Arc::clone(&self.rx)
    }

    /// Queue an item that bypasses admission (peer changes, shutdown).
    pub(crate) fn push(&self, item: Delivery) {
        self.len.fetch_add(1, Ordering::SeqCst);
        self.push_admitted(item);
    }

    /// Queue an item whose slot [`admit`](Self::admit) already reserved.
    pub(crate) fn push_admitted(&self, item: Delivery) {
        if self.tx.send(item).is_err() {
            self.release();
        }
    }

    /// Give back a slot reserved by `admit` that will not be pushed.
    pub(crate) fn release(&self) {
        self.len.fetch_sub(1, Ordering::SeqCst);
    }

    /// Called by the delivery thread for every item it takes.
    pub(crate) fn taken(&self) {
        self.len.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Apply the overflow policy before queueing an event or request.
    ///
    /// On success one slot is reserved and counted in `len`; follow up with
    /// [`push_admitted`](Self::push_admitted) or [`release`](Self::release).
    /// Under `Block` this sleeps the calling (producer) thread in
    /// `block_wait` steps until there is room or `alive` goes false.
    pub(crate) fn admit(&self, config: &DispatchConfig, alive: &AtomicBool) -> bool {
        let Some(capacity) = config.capacity else {
            self.len.fetch_add(1, Ordering::SeqCst);
            return true;
        };
        match config.policy {
            OverflowPolicy::Drop => {
                if !self.reserve(capacity) {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(capacity, "Delivery queue full, dropping inbound message");
                    return false;
                }
                true
            }
            OverflowPolicy::Block => loop {
                if !alive.load(Ordering::SeqCst) {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                if self.reserve(capacity) {
                    return true;
                }
                thread::sleep(config.block_wait);
            },
        }
    }

    fn reserve(&self, capacity: usize) -> bool {
        self.len
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |len| (len < capacity).then_some(len + 1))
            .is_ok()
    }
}
