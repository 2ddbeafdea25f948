//! Purchase Finalizer.
//!
//! Converts one live offer into a sold ticket. Payment has already been
//! captured and verified by the caller; nothing here talks to a gateway.
//!
//! An offer whose deadline has passed is rejected even if the expiry
//! handler has not flipped it yet: the accountant already stopped counting
//! it as a reservation, so honoring it could oversell.

use chrono::{DateTime, Duration, Utc};
use waitlist_store::Transaction;
use waitlist_types::{
    EntryId, EntryStatus, EventId, ExpiryTask, PaymentInfo, Result, Ticket, UserId,
    WaitlistError,
};

use crate::queue;

/// Everything the caller claims about one purchase.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub event_id: EventId,
    pub user_id: UserId,
    pub entry_id: EntryId,
    pub payment: PaymentInfo,
}

/// Issue a ticket for `request` and mark its entry PURCHASED.
///
/// Preconditions are checked in this order, each a distinct failure:
///
/// 1. entry exists ([`WaitlistError::EntryNotFound`])
/// 2. entry is OFFERED with a future deadline ([`WaitlistError::OfferNoLongerValid`])
/// 3. entry belongs to the caller ([`WaitlistError::EntryOwnershipMismatch`])
/// 4. entry belongs to the named event ([`WaitlistError::EntryEventMismatch`])
/// 5. event exists and is not cancelled ([`WaitlistError::EventNotActive`])
pub fn purchase(
    tx: &mut dyn Transaction,
    request: PurchaseRequest,
    now: DateTime<Utc>,
    offer_window: Duration,
) -> Result<(Ticket, Vec<ExpiryTask>)> {
    let PurchaseRequest {
        event_id,
        user_id,
        entry_id,
        payment,
    } = request;

    let mut entry = tx
        .entry(entry_id)?
        .ok_or(WaitlistError::EntryNotFound(entry_id))?;
    if entry.status != EntryStatus::Offered || !entry.holds_offer_at(now) {
        return Err(WaitlistError::OfferNoLongerValid {
            entry: entry_id,
            status: entry.status,
        });
    }
    if entry.user_id != user_id {
        return Err(WaitlistError::EntryOwnershipMismatch(entry_id));
    }
    if entry.event_id != event_id {
        return Err(WaitlistError::EntryEventMismatch {
            entry: entry_id,
            event: event_id,
        });
    }
    match tx.event(event_id)? {
        Some(event) if !event.is_cancelled => {}
        _ => return Err(WaitlistError::EventNotActive(event_id)),
    }

    let ticket = Ticket::issue(event_id, user_id, payment, now);
    tx.insert_ticket(ticket.clone())?;
    entry.mark_purchased()?;
    tx.put_entry(entry)?;

    tracing::info!(
        event = %event_id,
        user = %user_id,
        entry = %entry_id,
        ticket = %ticket.id,
        amount = %ticket.amount,
        "Ticket purchased"
    );

    let tasks = queue::promote_waiting(tx, event_id, now, offer_window)?;
    Ok((ticket, tasks))
}
