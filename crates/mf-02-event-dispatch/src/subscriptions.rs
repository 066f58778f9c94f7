//! Subscription bookkeeping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::MessageType;

use crate::handlers::EventHandler;

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    topic: MessageType,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> &MessageType {
        &self.topic
    }
}

struct Subscription {
    topic: MessageType,
    handler: Arc<dyn EventHandler>,
}

/// Active subscriptions, iterated in subscription order.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    next_id: AtomicU64,
    entries: RwLock<BTreeMap<u64, Subscription>>,
}

impl SubscriptionTable {
    pub(crate) fn insert(&self, topic: MessageType, handler: Arc<dyn EventHandler>) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(
            id,
            Subscription {
                topic: topic.clone(),
                handler,
            },
        );
        SubscriptionHandle { id, topic }
    }

    /// Remove a subscription, returning its topic if it existed.
    pub(crate) fn remove(&self, handle: &SubscriptionHandle) -> Option<MessageType> {
        self.entries.write().remove(&handle.id).map(|s| s.topic)
    }

    /// Handlers whose topic contains `topic`, cloned out of the lock so they
    /// may subscribe or unsubscribe while running.
    pub(crate) fn matching(&self, topic: &MessageType) -> Vec<Arc<dyn EventHandler>> {
        self.entries
            .read()
            .values()
            .filter(|s| s.topic.contains(topic))
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }

    /// Remove everything, returning each removed topic.
    pub(crate) fn drain(&self) -> Vec<MessageType> {
        std::mem::take(&mut *self.entries.write())
            .into_values()
            .map(|s| s.topic)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
