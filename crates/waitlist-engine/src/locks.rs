//! Per-event mutual exclusion.
//!
//! Every event-scoped mutation runs inside [`EventLocks::with_event`], so
//! the read-then-write sequence of the Queue Processor is serialized per
//! event whatever isolation the [`waitlist_store::Store`] provides.
//! Operations on different events proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use waitlist_types::EventId;

#[derive(Debug, Default)]
pub struct EventLocks {
    locks: DashMap<EventId, Arc<Mutex<()>>>,
}

impl EventLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock of `event`.
    ///
    /// Locks are not re-entrant: `f` must not call back into another
    /// section for the same event. The lock is dropped from the table once
    /// no other caller holds or waits on it.
    pub fn with_event<T>(&self, event: EventId, f: impl FnOnce() -> T) -> T {
        // Clone the Arc out so the shard guard is released before blocking.
        // Clones only happen under the shard guard, which `remove_if` also
        // takes, so a count of 1 there means nobody else can reach the lock.
        let lock = Arc::clone(self.locks.entry(event).or_default().value());
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        self.locks
            .remove_if(&event, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Number of events with a lock currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
