//! Error types for the waiting-list engine.
//!
//! All errors use the `WL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Waiting-list errors
//! - 2xx: Event errors
//! - 3xx: Ticket errors
//! - 4xx: Throttling
//! - 5xx: Refund errors
//! - 6xx: Storage errors
//! - 9xx: General / internal errors
//!
//! Every variant except [`WaitlistError::RateLimited`] is terminal for the
//! request that produced it, and is raised before any state is written.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntryId, EntryStatus, EventId, TicketId, TicketStatus, UserId};

/// One ticket whose refund failed during a batch refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundFailure {
    pub ticket_id: TicketId,
    pub reason: String,
}

/// Central error enum for all engine operations.
#[derive(Debug, Error)]
pub enum WaitlistError {
    // =================================================================
    // Waiting-list Errors (1xx)
    // =================================================================
    /// The user already holds a live (non-expired) entry for this event.
    #[error("WL_ERR_100: User {user} is already in the waiting list for {event}")]
    AlreadyQueued { user: UserId, event: EventId },

    /// The requested waiting-list entry does not exist.
    #[error("WL_ERR_101: Waiting list entry not found: {0}")]
    EntryNotFound(EntryId),

    /// The entry is not in OFFERED state, or its offer deadline has passed.
    #[error("WL_ERR_102: Ticket offer is no longer valid: {entry} is {status}")]
    OfferNoLongerValid { entry: EntryId, status: EntryStatus },

    /// The entry belongs to another user.
    #[error("WL_ERR_103: Waiting list entry {0} does not belong to this user")]
    EntryOwnershipMismatch(EntryId),

    /// The entry belongs to another event than the one named by the caller.
    #[error("WL_ERR_104: Waiting list entry {entry} does not belong to {event}")]
    EntryEventMismatch { entry: EntryId, event: EventId },

    /// A status change that the entry state machine forbids.
    #[error("WL_ERR_105: Invalid entry transition for {entry}: {from} -> {to}")]
    InvalidTransition {
        entry: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    },

    // =================================================================
    // Event Errors (2xx)
    // =================================================================
    /// The event does not exist.
    #[error("WL_ERR_200: Event not found: {0}")]
    EventNotFound(EventId),

    /// The event is cancelled and can no longer sell tickets.
    #[error("WL_ERR_201: Event not active: {0}")]
    EventNotActive(EventId),

    /// Cancellation refused until sold tickets are refunded.
    #[error("WL_ERR_202: Event {event} still has {count} active tickets; refund them first")]
    HasActiveTickets { event: EventId, count: usize },

    /// A capacity update would drop below the number of tickets already sold.
    #[error("WL_ERR_203: Cannot reduce total tickets to {requested}: {sold} already sold")]
    CapacityBelowSold { requested: u32, sold: u32 },

    /// Capacity must be at least one ticket.
    #[error("WL_ERR_204: Invalid capacity: {0}")]
    InvalidCapacity(u32),

    /// A capacity update would drop below sold tickets plus live offers.
    #[error(
        "WL_ERR_205: Cannot reduce total tickets to {requested}: {sold} sold and {offered} on offer"
    )]
    CapacityBelowReserved {
        requested: u32,
        sold: u32,
        offered: u32,
    },

    // =================================================================
    // Ticket Errors (3xx)
    // =================================================================
    /// The requested ticket does not exist.
    #[error("WL_ERR_300: Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// A ticket status change that is not allowed.
    #[error("WL_ERR_301: Invalid ticket transition for {ticket}: {from} -> {to}")]
    InvalidTicketTransition {
        ticket: TicketId,
        from: TicketStatus,
        to: TicketStatus,
    },

    // =================================================================
    // Throttling (4xx)
    // =================================================================
    /// The join quota for this user is exhausted. Retryable.
    #[error("WL_ERR_400: Joined the waiting list too many times; retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    // =================================================================
    // Refund Errors (5xx)
    // =================================================================
    /// Some refunds in a batch failed; the event was not cancelled.
    #[error(
        "WL_ERR_500: Refund incomplete for {event}: {refunded} refunded, {} failed",
        .failures.len()
    )]
    RefundIncomplete {
        event: EventId,
        refunded: usize,
        failures: Vec<RefundFailure>,
    },

    // =================================================================
    // Storage Errors (6xx)
    // =================================================================
    /// The storage collaborator rejected the operation.
    #[error("WL_ERR_600: Storage error: {0}")]
    Storage(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("WL_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("WL_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("WL_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl WaitlistError {
    /// Whether the caller may retry the same request later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// How long a throttled caller should wait, if this is a throttling error.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(Duration::from_millis(*retry_after_ms)),
            _ => None,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, WaitlistError>;

impl From<serde_json::Error> for WaitlistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
