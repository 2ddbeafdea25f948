//! # waitlist-engine
//!
//! Ticket admission and waiting-list allocation.
//!
//! An event has a fixed number of tickets. Users join a per-event FIFO
//! waiting list; whenever a slot is free, the oldest waiting user receives a
//! time-bounded offer. Offers are either purchased, released, or expire, and
//! every one of those outcomes re-runs the queue.
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`inventory`] | Inventory Accountant: free slots from sold tickets and live offers |
//! | [`join`] | Join Gate: de-duplicate, insert, admit |
//! | [`queue`] | Queue Processor: offer free slots in FIFO order |
//! | [`scheduler`] | Offer Scheduler: one-shot expiry timers |
//! | [`expiry`] | Expiry handler, user release, safety-net sweep |
//! | [`purchase`] | Purchase Finalizer |
//! | [`cancellation`] | Cancellation and batch refund |
//! | [`rate_limit`] | Join throttling |
//! | [`locks`] | Per-event critical sections |
//! | [`runtime`] | Tokio tasks for timers and the periodic sweep |
//! | [`telemetry`] | `tracing` subscriber setup |
//!
//! ## Invariants
//!
//! - `purchased + live offers <= total_tickets` for every event.
//! - At most one non-expired entry per (user, event).
//! - Entries move only forward: WAITING → OFFERED → PURCHASED | EXPIRED.
//! - WAITING entries are offered in creation order.

pub mod cancellation;
pub mod engine;
pub mod expiry;
pub mod inventory;
pub mod join;
pub mod locks;
pub mod purchase;
pub mod queue;
pub mod rate_limit;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;

pub use cancellation::{RefundGateway, RefundReport};
pub use engine::WaitlistEngine;
pub use expiry::{ExpiryOutcome, SweepReport};
pub use locks::EventLocks;
pub use purchase::PurchaseRequest;
pub use rate_limit::{FixedWindowLimiter, RateDecision, RateLimiter, Unlimited};
pub use scheduler::{ManualScheduler, OfferScheduler, ScheduleId, TokioScheduler};
