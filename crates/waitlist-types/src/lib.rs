//! # waitlist-types
//!
//! Shared types, errors, and configuration for the **Waitlist** ticket
//! admission engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`EventId`], [`UserId`], [`TicketId`], [`EntryId`]
//! - **Event model**: [`Event`], [`NewEvent`], [`EventUpdate`]
//! - **Ticket model**: [`Ticket`], [`TicketStatus`], [`PaymentInfo`]
//! - **Waiting list**: [`WaitingListEntry`], [`EntryStatus`]
//! - **Read models**: [`Availability`], [`QueuePosition`], [`JoinOutcome`], [`EventMetrics`],
//!   [`SellerEvent`], [`TicketDetails`]
//! - **Scheduling payload**: [`ExpiryTask`]
//! - **Time**: [`Clock`], [`SystemClock`]
//! - **Configuration**: [`EngineConfig`], [`RateLimitPolicy`], [`LoggingConfig`]
//! - **Errors**: [`WaitlistError`] with `WL_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod availability;
pub mod clock;
pub mod config;
pub mod constants;
pub mod entry;
pub mod error;
pub mod event;
pub mod ids;
pub mod schedule;
pub mod ticket;

// Re-export all primary types at crate root for ergonomic imports:
//   use waitlist_types::{Event, WaitingListEntry, Ticket, ...};

pub use availability::*;
pub use clock::*;
pub use config::*;
pub use entry::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use schedule::*;
pub use ticket::*;

// Constants are accessed via `waitlist_types::constants::FOO`
// (not re-exported to avoid name collisions).
