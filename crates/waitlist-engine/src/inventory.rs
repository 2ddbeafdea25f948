//! Inventory Accountant.
//!
//! Free slots are derived on every read from the tickets and entries in one
//! transaction; no counter is stored anywhere. An OFFERED entry reserves a
//! slot only while its deadline is in the future, so offers the scheduler
//! has not flipped yet stop counting the moment they lapse.

use chrono::{DateTime, Utc};
use waitlist_store::Transaction;
use waitlist_types::{
    Availability, EntryStatus, Event, EventId, Result, TicketStatus, WaitlistError,
};

/// Availability of `event_id` at `now`.
///
/// # Errors
/// Returns [`WaitlistError::EventNotFound`] if the event does not exist.
pub fn availability(
    tx: &dyn Transaction,
    event_id: EventId,
    now: DateTime<Utc>,
) -> Result<Availability> {
    let event = tx
        .event(event_id)?
        .ok_or(WaitlistError::EventNotFound(event_id))?;
    availability_of(tx, &event, now)
}

/// Availability of an already loaded event. A cancelled event has no free
/// slots.
pub fn availability_of(
    tx: &dyn Transaction,
    event: &Event,
    now: DateTime<Utc>,
) -> Result<Availability> {
    let purchased = clamp(tx.count_tickets(event.id, &TicketStatus::ACTIVE)?);
    let active_offers = clamp(
        tx.entries_for_event(event.id, Some(EntryStatus::Offered), None)?
            .iter()
            .filter(|e| e.holds_offer_at(now))
            .count(),
    );

    Ok(if event.is_cancelled {
        Availability::closed(event.total_tickets, purchased, active_offers)
    } else {
        Availability::compute(event.total_tickets, purchased, active_offers)
    })
}

fn clamp(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
