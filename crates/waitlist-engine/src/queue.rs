//! Queue Processor: the admission-control loop.
//!
//! [`promote_waiting`] is a pure function of the current store state. It
//! recomputes free slots and offers them to the oldest WAITING entries, so
//! calling it redundantly after every mutation is always safe. It runs
//! inside the caller's transaction; the returned [`ExpiryTask`]s must only
//! be handed to a scheduler after that transaction commits.

use chrono::{DateTime, Duration, Utc};
use waitlist_store::Transaction;
use waitlist_types::{EntryStatus, EventId, ExpiryTask, Result, WaitlistError};

use crate::inventory;

/// Offer every free slot of `event_id` to the next WAITING entries in FIFO
/// order, each with a deadline of `now + offer_window`.
///
/// Returns one expiry task per offer made; empty when nothing was free.
///
/// # Errors
/// - [`WaitlistError::EventNotFound`] if the event does not exist
/// - [`WaitlistError::Configuration`] if `now + offer_window` overflows
pub fn promote_waiting(
    tx: &mut dyn Transaction,
    event_id: EventId,
    now: DateTime<Utc>,
    offer_window: Duration,
) -> Result<Vec<ExpiryTask>> {
    let event = tx
        .event(event_id)?
        .ok_or(WaitlistError::EventNotFound(event_id))?;
    let free = inventory::availability_of(tx, &event, now)?.free_slots;
    if free == 0 {
        return Ok(Vec::new());
    }

    let limit = usize::try_from(free).unwrap_or(usize::MAX);
    let next = tx.entries_for_event(event_id, Some(EntryStatus::Waiting), Some(limit))?;
    let deadline = now.checked_add_signed(offer_window).ok_or_else(|| {
        WaitlistError::Configuration(format!("offer window {offer_window} overflows the deadline"))
    })?;

    let mut tasks = Vec::with_capacity(next.len());
    for mut entry in next {
        entry.offer(deadline)?;
        tracing::info!(
            event = %event_id,
            entry = %entry.id,
            user = %entry.user_id,
            expires_at = %deadline,
            "Ticket offered"
        );
        tasks.push(ExpiryTask::new(entry.id, event_id, deadline));
        tx.put_entry(entry)?;
    }
    Ok(tasks)
}
