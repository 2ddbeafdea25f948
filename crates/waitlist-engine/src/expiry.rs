//! Offer expiry: the scheduled handler, user release, and the safety-net
//! sweep.
//!
//! The handler is idempotent. A payload for an entry that is gone or no
//! longer OFFERED is a no-op, which absorbs redelivered timers and timers
//! that lost the race with a purchase or release.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use waitlist_store::Transaction;
use waitlist_types::{EntryId, EntryStatus, EventId, ExpiryTask, Result, WaitlistError};

use crate::queue;

/// What an expiry invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// The offer was flipped to EXPIRED; `promoted` holds the offers made
    /// to the next waiters.
    Expired { promoted: Vec<ExpiryTask> },
    /// Nothing to do: the entry is missing or not OFFERED.
    Noop,
}

/// Expiry handler for one scheduled payload.
///
/// # Errors
/// Returns [`WaitlistError::EntryEventMismatch`] if the payload names
/// another event than the entry's own.
pub fn expire_offer(
    tx: &mut dyn Transaction,
    entry_id: EntryId,
    event_id: EventId,
    now: DateTime<Utc>,
    offer_window: Duration,
) -> Result<ExpiryOutcome> {
    let Some(mut entry) = tx.entry(entry_id)? else {
        tracing::debug!(entry = %entry_id, event = %event_id, "Expiry for unknown entry ignored");
        return Ok(ExpiryOutcome::Noop);
    };
    if entry.status != EntryStatus::Offered {
        tracing::debug!(
            entry = %entry_id,
            status = %entry.status,
            "Expiry for settled entry ignored"
        );
        return Ok(ExpiryOutcome::Noop);
    }
    if entry.event_id != event_id {
        return Err(WaitlistError::EntryEventMismatch {
            entry: entry_id,
            event: event_id,
        });
    }

    entry.mark_expired()?;
    let user = entry.user_id;
    tx.put_entry(entry)?;
    tracing::info!(event = %event_id, entry = %entry_id, user = %user, "Offer expired");

    let promoted = queue::promote_waiting(tx, event_id, now, offer_window)?;
    Ok(ExpiryOutcome::Expired { promoted })
}

/// User-initiated release of an offer before its deadline.
///
/// # Errors
/// - [`WaitlistError::EntryNotFound`] if the entry does not exist
/// - [`WaitlistError::EntryEventMismatch`] if it belongs to another event
/// - [`WaitlistError::OfferNoLongerValid`] unless it is OFFERED
pub fn release(
    tx: &mut dyn Transaction,
    event_id: EventId,
    entry_id: EntryId,
    now: DateTime<Utc>,
    offer_window: Duration,
) -> Result<Vec<ExpiryTask>> {
    let mut entry = tx
        .entry(entry_id)?
        .ok_or(WaitlistError::EntryNotFound(entry_id))?;
    if entry.event_id != event_id {
        return Err(WaitlistError::EntryEventMismatch {
            entry: entry_id,
            event: event_id,
        });
    }
    if entry.status != EntryStatus::Offered {
        return Err(WaitlistError::OfferNoLongerValid {
            entry: entry_id,
            status: entry.status,
        });
    }

    entry.mark_expired()?;
    let user = entry.user_id;
    tx.put_entry(entry)?;
    tracing::info!(event = %event_id, entry = %entry_id, user = %user, "Offer released");

    queue::promote_waiting(tx, event_id, now, offer_window)
}

/// Flip every still-overdue offer among `entries` to EXPIRED, then run the
/// Queue Processor once for the event.
///
/// Entries settled since they were listed are skipped. Returns the number
/// expired and the offers made.
pub fn expire_overdue(
    tx: &mut dyn Transaction,
    event_id: EventId,
    entries: &[EntryId],
    now: DateTime<Utc>,
    offer_window: Duration,
) -> Result<(usize, Vec<ExpiryTask>)> {
    let mut expired = 0;
    for &entry_id in entries {
        let Some(mut entry) = tx.entry(entry_id)? else {
            continue;
        };
        let overdue = entry.status == EntryStatus::Offered
            && entry.event_id == event_id
            && entry.offer_expires_at.is_some_and(|d| d <= now);
        if !overdue {
            continue;
        }
        entry.mark_expired()?;
        tx.put_entry(entry)?;
        expired += 1;
    }

    let promoted = if expired > 0 {
        queue::promote_waiting(tx, event_id, now, offer_window)?
    } else {
        Vec::new()
    };
    Ok((expired, promoted))
}

/// Result of one cleanup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Events that had at least one overdue offer.
    pub events: usize,
    /// Offers flipped to EXPIRED.
    pub expired: usize,
    /// New offers made by the follow-up queue runs.
    pub offered: usize,
    /// Events whose batch failed and was rolled back.
    pub failed_events: Vec<EventId>,
}
