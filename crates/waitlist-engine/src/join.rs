//! Join Gate, transactional part.
//!
//! Throttling happens before the transaction (see
//! [`crate::WaitlistEngine::join_waiting_list`]). Inside it, the duplicate
//! check, the insert and the Queue Processor run against the same
//! snapshot, so two concurrent joins by one user cannot both pass.

use chrono::{DateTime, Duration, Utc};
use waitlist_store::Transaction;
use waitlist_types::{
    EntryStatus, EventId, ExpiryTask, JoinOutcome, Result, UserId, WaitingListEntry,
    WaitlistError,
};

use crate::queue;

/// Insert a WAITING entry for `user_id` and immediately run the Queue
/// Processor for the event.
///
/// # Errors
/// - [`WaitlistError::AlreadyQueued`] if the user holds a live entry
/// - [`WaitlistError::EventNotFound`] if the event does not exist
pub fn join(
    tx: &mut dyn Transaction,
    event_id: EventId,
    user_id: UserId,
    now: DateTime<Utc>,
    offer_window: Duration,
) -> Result<(JoinOutcome, Vec<ExpiryTask>)> {
    if tx.live_entry(user_id, event_id)?.is_some() {
        return Err(WaitlistError::AlreadyQueued {
            user: user_id,
            event: event_id,
        });
    }
    if tx.event(event_id)?.is_none() {
        return Err(WaitlistError::EventNotFound(event_id));
    }

    let entry = WaitingListEntry::new(event_id, user_id, now);
    let entry_id = entry.id;
    tx.insert_entry(entry)?;

    let tasks = queue::promote_waiting(tx, event_id, now, offer_window)?;
    let status = if tasks.iter().any(|t| t.entry_id == entry_id) {
        EntryStatus::Offered
    } else {
        EntryStatus::Waiting
    };

    tracing::info!(
        event = %event_id,
        user = %user_id,
        entry = %entry_id,
        status = %status,
        "Joined waiting list"
    );
    Ok((
        JoinOutcome::new(entry_id, status, offer_window),
        tasks,
    ))
}
