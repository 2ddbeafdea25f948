//! Sold tickets.
//!
//! A ticket is created exactly once per successful purchase and never
//! deleted. Its status moves forward only:
//!
//! ```text
//!   VALID ──▶ USED ──▶ REFUNDED
//!     │                   ▲
//!     ├───────────────────┘
//!     └──▶ CANCELLED
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EventId, TicketId, UserId, WaitlistError};

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Valid,
    Used,
    Refunded,
    Cancelled,
}

impl TicketStatus {
    /// Statuses that consume a slot of event capacity.
    pub const ACTIVE: [Self; 2] = [Self::Valid, Self::Used];

    /// Whether this ticket still occupies inventory.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Valid | Self::Used)
    }

    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Valid, Self::Used | Self::Refunded | Self::Cancelled)
                | (Self::Used, Self::Refunded)
        )
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::Used => write!(f, "USED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Payment facts supplied by the payment layer after it has verified a
/// successful charge. The engine trusts these and never re-verifies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    /// Gateway reference (payment intent / payment id) used for refunds.
    pub payment_ref: String,
    pub amount: Decimal,
}

impl PaymentInfo {
    #[must_use]
    pub fn new(payment_ref: impl Into<String>, amount: Decimal) -> Self {
        Self {
            payment_ref: payment_ref.into(),
            amount,
        }
    }
}

/// A sold ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub event_id: EventId,
    pub user_id: UserId,
    pub status: TicketStatus,
    pub purchased_at: DateTime<Utc>,
    pub payment_ref: String,
    pub amount: Decimal,
}

impl Ticket {
    /// Issue a VALID ticket for a completed payment.
    #[must_use]
    pub fn issue(
        event_id: EventId,
        user_id: UserId,
        payment: PaymentInfo,
        purchased_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TicketId::new(),
            event_id,
            user_id,
            status: TicketStatus::Valid,
            purchased_at,
            payment_ref: payment.payment_ref,
            amount: payment.amount,
        }
    }

    /// Move the ticket to `target`.
    ///
    /// # Errors
    /// Returns [`WaitlistError::InvalidTicketTransition`] for backward or
    /// repeated transitions.
    pub fn set_status(&mut self, target: TicketStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(WaitlistError::InvalidTicketTransition {
                ticket: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}
