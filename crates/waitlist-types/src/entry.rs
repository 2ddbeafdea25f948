//! # WaitingListEntry: one user's place in one event's queue
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  admit   ┌─────────┐  purchase   ┌───────────┐
//!   │ WAITING ├─────────▶│ OFFERED ├────────────▶│ PURCHASED │
//!   └─────────┘          └────┬────┘             └───────────┘
//!                             │ deadline / release
//!                             ▼
//!                        ┌─────────┐
//!                        │ EXPIRED │
//!                        └─────────┘
//! ```
//!
//! Transitions only move forward. PURCHASED and EXPIRED are terminal, and
//! `offer_expires_at` is set exactly while the entry is OFFERED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, EventId, UserId, WaitlistError};

/// Lifecycle state of a waiting-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Queued, no slot reserved yet.
    Waiting,
    /// Holding a time-bounded reservation of one slot.
    Offered,
    /// The offer was converted into a ticket. Terminal.
    Purchased,
    /// The offer lapsed or was released. Terminal.
    Expired,
}

impl EntryStatus {
    /// Can an entry in this state move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Offered) | (Self::Offered, Self::Purchased | Self::Expired)
        )
    }

    /// Live entries block the same user from joining the same event again.
    #[must_use]
    pub fn is_live(&self) -> bool {
        *self != Self::Expired
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Purchased | Self::Expired)
    }

    /// Entries in these states count toward a user's queue position.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Waiting | Self::Offered)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Offered => write!(f, "OFFERED"),
            Self::Purchased => write!(f, "PURCHASED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A user's entry in an event's waiting list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingListEntry {
    pub id: EntryId,
    pub event_id: EventId,
    pub user_id: UserId,
    pub status: EntryStatus,
    /// Deadline of the current offer. `Some` iff `status == Offered`.
    pub offer_expires_at: Option<DateTime<Utc>>,
    /// Defines FIFO order within the event, ties broken by `id`.
    pub created_at: DateTime<Utc>,
}

impl WaitingListEntry {
    /// A fresh WAITING entry.
    #[must_use]
    pub fn new(event_id: EventId, user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            event_id,
            user_id,
            status: EntryStatus::Waiting,
            offer_expires_at: None,
            created_at,
        }
    }

    /// FIFO sort key shared by queue selection and queue position.
    #[must_use]
    pub fn queue_key(&self) -> (DateTime<Utc>, EntryId) {
        (self.created_at, self.id)
    }

    /// OFFERED with a deadline still in the future at `now`.
    ///
    /// Only these entries reserve a slot. Overdue offers the scheduler has
    /// not flipped yet do not.
    #[must_use]
    pub fn holds_offer_at(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Offered && self.offer_expires_at.is_some_and(|d| d > now)
    }

    /// WAITING → OFFERED, stamping the offer deadline.
    ///
    /// # Errors
    /// Returns [`WaitlistError::InvalidTransition`] unless the entry is WAITING.
    pub fn offer(&mut self, expires_at: DateTime<Utc>) -> crate::Result<()> {
        self.transition(EntryStatus::Offered)?;
        self.offer_expires_at = Some(expires_at);
        Ok(())
    }

    /// OFFERED → PURCHASED.
    ///
    /// # Errors
    /// Returns [`WaitlistError::InvalidTransition`] unless the entry is OFFERED.
    pub fn mark_purchased(&mut self) -> crate::Result<()> {
        self.transition(EntryStatus::Purchased)?;
        self.offer_expires_at = None;
        Ok(())
    }

    /// OFFERED → EXPIRED.
    ///
    /// # Errors
    /// Returns [`WaitlistError::InvalidTransition`] unless the entry is OFFERED.
    pub fn mark_expired(&mut self) -> crate::Result<()> {
        self.transition(EntryStatus::Expired)?;
        self.offer_expires_at = None;
        Ok(())
    }

    fn transition(&mut self, target: EntryStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(WaitlistError::InvalidTransition {
                entry: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}
