//! Bounded, newest-first store of recent feed events.
//!
//! Every mutation publishes a fresh immutable snapshot through a `watch`
//! channel. Readers hold an `Arc` to a complete vector and never see a
//! half-applied insert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::events::FeedEvent;
use super::view::BufferView;

/// How `insert` treats an event whose key is already buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    /// Always prepend. Repeated keys appear once per delivery.
    Prepend,
    /// Drop the older entry with the same key before prepending.
    ReplaceByKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferEntry<E> {
    pub event: E,
    pub received_at: DateTime<Utc>,
}

/// Ordered newest-first, never longer than the buffer's capacity.
pub type Snapshot<E> = Arc<Vec<BufferEntry<E>>>;

pub struct NotificationBuffer<E: FeedEvent> {
    capacity: usize,
    policy: InsertPolicy,
    tx: watch::Sender<Snapshot<E>>,
}

impl<E: FeedEvent> NotificationBuffer<E> {
    pub fn new(capacity: usize, policy: InsertPolicy) -> Self {
        let (tx, _) = watch::channel(Arc::new(Vec::with_capacity(capacity)));
        Self { capacity, policy, tx }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> InsertPolicy {
        self.policy
    }

    pub fn insert(&self, event: E) {
        self.insert_at(event, Utc::now());
    }

    /// Prepend `event`, evicting from the tail once over capacity.
    pub fn insert_at(&self, event: E, received_at: DateTime<Utc>) {
        let capacity = self.capacity;
        let policy = self.policy;
        self.tx.send_modify(move |snapshot| {
            let entries = Arc::make_mut(snapshot);
            if policy == InsertPolicy::ReplaceByKey {
                let key = event.dedup_key();
                entries.retain(|e| e.event.dedup_key() != key);
            }
            entries.insert(0, BufferEntry { event, received_at });
            entries.truncate(capacity);
        });
    }

    /// Empty the buffer. Watchers are only woken if something was removed.
    pub fn clear(&self) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.is_empty() {
                false
            } else {
                *snapshot = Arc::new(Vec::new());
                true
            }
        });
    }

    pub fn snapshot(&self) -> Snapshot<E> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Read-only handle for the rendering layer.
    pub fn view(&self) -> BufferView<E> {
        BufferView::new(self.tx.subscribe())
    }
}
