//! Derived read models: inventory snapshot, queue position, join outcome,
//! and seller metrics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EntryId, EntryStatus, Event, Ticket, WaitingListEntry};

/// Inventory of one event at one instant.
///
/// `free_slots = max(0, total - purchased - active_offers)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub total_tickets: u32,
    /// Tickets in VALID or USED.
    pub purchased_count: u32,
    /// OFFERED entries whose deadline has not yet passed.
    pub active_offer_count: u32,
    pub free_slots: u32,
    pub is_sold_out: bool,
}

impl Availability {
    /// Compute the snapshot from raw counts.
    #[must_use]
    pub fn compute(total_tickets: u32, purchased_count: u32, active_offer_count: u32) -> Self {
        let reserved = purchased_count.saturating_add(active_offer_count);
        let free_slots = total_tickets.saturating_sub(reserved);
        Self {
            total_tickets,
            purchased_count,
            active_offer_count,
            free_slots,
            is_sold_out: free_slots == 0,
        }
    }

    /// A cancelled event admits nobody.
    #[must_use]
    pub fn closed(total_tickets: u32, purchased_count: u32, active_offer_count: u32) -> Self {
        Self {
            free_slots: 0,
            is_sold_out: true,
            ..Self::compute(total_tickets, purchased_count, active_offer_count)
        }
    }

    /// Tickets still obtainable by new joiners. Same as `free_slots`.
    #[must_use]
    pub fn remaining_tickets(&self) -> u32 {
        self.free_slots
    }

    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.free_slots > 0
    }
}

/// A user's live entry and its 1-based position in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    pub entry: WaitingListEntry,
    /// `1 + number of WAITING/OFFERED entries created strictly before this one`.
    pub position: usize,
}

/// What a joining user learns about the result of their join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub entry_id: EntryId,
    /// `Offered` if a slot was free for this user, otherwise `Waiting`.
    pub status: EntryStatus,
    pub message: String,
}

impl JoinOutcome {
    #[must_use]
    pub fn new(entry_id: EntryId, status: EntryStatus, offer_window: chrono::Duration) -> Self {
        let message = if status == EntryStatus::Offered {
            format!(
                "Ticket offered - you have {} to purchase",
                describe_window(offer_window)
            )
        } else {
            "Added to waiting list - you'll be notified when a ticket is available".to_string()
        };
        Self {
            entry_id,
            status,
            message,
        }
    }
}

/// Whole minutes when the window is a multiple of a minute, otherwise
/// seconds rounded up.
fn describe_window(window: chrono::Duration) -> String {
    let ms = window.num_milliseconds().max(0);
    if ms >= 60_000 && ms % 60_000 == 0 {
        plural(ms / 60_000, "minute")
    } else {
        plural((ms + 999) / 1000, "second")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Per-event sales figures for the seller dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetrics {
    pub sold_tickets: u32,
    pub refunded_tickets: u32,
    pub cancelled_tickets: u32,
    /// `sold_tickets * price`.
    pub revenue: Decimal,
}

/// One of a seller's events with its sales figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerEvent {
    pub event: Event,
    pub metrics: EventMetrics,
}

/// A ticket together with the event it admits to. `event` is `None` only
/// if the event record has gone missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub event: Option<Event>,
}
