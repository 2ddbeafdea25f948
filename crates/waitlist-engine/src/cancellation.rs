//! Cancellation and refund coordination.
//!
//! An event can only be cancelled once none of its tickets is VALID or
//! USED. Cancelling marks the event and deletes every waiting-list entry
//! it has; no queue run follows because the event admits nobody again.
//!
//! The batch refund attempts every active ticket independently. Successful
//! refunds stay refunded even when a sibling fails; any failure leaves the
//! event active and is reported per ticket for manual follow-up.

use serde::{Deserialize, Serialize};
use waitlist_store::Transaction;
use waitlist_types::{EventId, Result, Ticket, TicketId, TicketStatus, WaitlistError};

/// External payment gateway able to refund a captured payment.
pub trait RefundGateway: Send + Sync {
    /// Refund the payment behind `ticket`. `Err` carries the gateway's
    /// reason and is reported, never retried here.
    fn refund(&self, ticket: &Ticket) -> std::result::Result<(), String>;
}

/// Outcome of a completed refund-and-cancel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReport {
    pub refunded: usize,
    /// Waiting-list entries deleted by the cancellation.
    pub entries_removed: usize,
}

/// Mark `event_id` cancelled and delete all of its waiting-list entries.
///
/// Returns the number of entries deleted.
///
/// # Errors
/// - [`WaitlistError::EventNotFound`] if the event does not exist
/// - [`WaitlistError::HasActiveTickets`] while any ticket is VALID or USED
pub fn cancel_event(tx: &mut dyn Transaction, event_id: EventId) -> Result<usize> {
    let mut event = tx
        .event(event_id)?
        .ok_or(WaitlistError::EventNotFound(event_id))?;
    let active = tx.count_tickets(event_id, &TicketStatus::ACTIVE)?;
    if active > 0 {
        return Err(WaitlistError::HasActiveTickets {
            event: event_id,
            count: active,
        });
    }

    event.is_cancelled = true;
    tx.put_event(event)?;

    let entries = tx.entries_for_event(event_id, None, None)?;
    for entry in &entries {
        tx.delete_entry(entry.id)?;
    }
    tracing::info!(event = %event_id, entries_removed = entries.len(), "Event cancelled");
    Ok(entries.len())
}

/// Record a successful gateway refund.
///
/// A ticket that left the active set in the meantime is left alone and
/// reported as not changed.
pub fn mark_refunded(tx: &mut dyn Transaction, ticket_id: TicketId) -> Result<bool> {
    let mut ticket = tx
        .ticket(ticket_id)?
        .ok_or(WaitlistError::TicketNotFound(ticket_id))?;
    if !ticket.status.is_active() {
        return Ok(false);
    }
    ticket.set_status(TicketStatus::Refunded)?;
    tx.put_ticket(ticket)?;
    Ok(true)
}
