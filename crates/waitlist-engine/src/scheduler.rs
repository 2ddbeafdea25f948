//! Offer Scheduler.
//!
//! One one-shot timer per offer, carrying an [`ExpiryTask`] payload. Timers
//! are never cancelled: when an offer is purchased or released early, the
//! late firing reaches the idempotent expiry handler and does nothing.
//!
//! Two implementations:
//!
//! - [`TokioScheduler`] sleeps on the tokio timer and forwards each payload
//!   to a channel that [`crate::runtime::spawn_expiry_dispatcher`] drains.
//! - [`ManualScheduler`] only records payloads; the host pulls due ones
//!   with [`ManualScheduler::take_due`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use waitlist_types::{ExpiryTask, Result, WaitlistError};

/// Handle of one scheduled payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleId(pub u64);

/// Deferred delivery of expiry payloads. Delivery is at-least-once.
pub trait OfferScheduler: Send + Sync {
    /// Deliver `task` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, task: ExpiryTask) -> ScheduleId;
}

/// Timer-backed scheduler on a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    handle: Handle,
    sender: mpsc::UnboundedSender<ExpiryTask>,
    next_id: AtomicU64,
}

impl TokioScheduler {
    /// Scheduler spawning its timers on `handle`, plus the receiving end of
    /// the payload channel.
    #[must_use]
    pub fn new(handle: Handle) -> (Self, mpsc::UnboundedReceiver<ExpiryTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scheduler = Self {
            handle,
            sender,
            next_id: AtomicU64::new(0),
        };
        (scheduler, receiver)
    }

    /// Like [`TokioScheduler::new`] on the runtime of the calling task.
    ///
    /// # Errors
    /// Returns [`WaitlistError::Configuration`] outside a tokio runtime.
    pub fn current() -> Result<(Self, mpsc::UnboundedReceiver<ExpiryTask>)> {
        let handle = Handle::try_current()
            .map_err(|e| WaitlistError::Configuration(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(handle))
    }
}

impl OfferScheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: ExpiryTask) -> ScheduleId {
        let id = ScheduleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sender = self.sender.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(task).is_err() {
                tracing::debug!(
                    entry = %task.entry_id,
                    event = %task.event_id,
                    "Expiry dispatcher closed, dropping task"
                );
            }
        });
        id
    }
}

/// Pull-based scheduler. Nothing fires on its own.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(ScheduleId, ExpiryTask)>>,
    next_id: AtomicU64,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every task due at `now`, earliest deadline first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ExpiryTask> {
        let mut pending = self.pending.lock();
        let (mut due, rest): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|(_, task)| task.is_due(now));
        *pending = rest;
        due.sort_by_key(|(id, task)| (task.fire_at, *id));
        due.into_iter().map(|(_, task)| task).collect()
    }

    /// Snapshot of tasks not yet taken.
    pub fn pending(&self) -> Vec<ExpiryTask> {
        self.pending.lock().iter().map(|(_, task)| *task).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl OfferScheduler for ManualScheduler {
    fn schedule_after(&self, _delay: Duration, task: ExpiryTask) -> ScheduleId {
        let id = ScheduleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().push((id, task));
        id
    }
}
