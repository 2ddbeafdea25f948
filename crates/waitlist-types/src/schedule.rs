//! Payload of a scheduled offer-expiry callback.
//!
//! The payload is plain data captured when the offer is made. A scheduler
//! that redelivers it after a restart reconstructs the callback from these
//! fields alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, EventId};

/// "Expire entry `entry_id` of event `event_id` at `fire_at`."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpiryTask {
    pub entry_id: EntryId,
    pub event_id: EventId,
    /// The offer deadline the task was scheduled for.
    pub fire_at: DateTime<Utc>,
}

impl ExpiryTask {
    #[must_use]
    pub fn new(entry_id: EntryId, event_id: EventId, fire_at: DateTime<Utc>) -> Self {
        Self {
            entry_id,
            event_id,
            fire_at,
        }
    }

    /// Whether the task should have fired by `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }

    /// Remaining delay from `now`, zero if already due.
    #[must_use]
    pub fn delay_from(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.fire_at - now).to_std().unwrap_or_default()
    }
}
