//! The engine facade.
//!
//! Every event-scoped mutation follows the same shape:
//!
//! ```text
//!   clock.now()
//!     └─ EventLocks::with_event(event)
//!          └─ Store::transaction(component fn, ends with Queue Processor)
//!   commit ─▶ OfferScheduler::schedule_after(..) for each new offer
//! ```
//!
//! Timers are scheduled only after the transaction that created the offer
//! has committed, so a timer can never fire for an offer that was rolled
//! back.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use waitlist_store::{Store, Transaction};
use waitlist_types::{
    Availability, Clock, EngineConfig, EntryId, Event, EventId, EventMetrics, EventUpdate,
    ExpiryTask, JoinOutcome, NewEvent, PaymentInfo, QueuePosition, RefundFailure, Result,
    SellerEvent, SystemClock, Ticket, TicketDetails, TicketId, TicketStatus, UserId,
    WaitingListEntry, WaitlistError,
};

use crate::cancellation::{self, RefundGateway, RefundReport};
use crate::expiry::{self, ExpiryOutcome, SweepReport};
use crate::locks::EventLocks;
use crate::purchase::{self, PurchaseRequest};
use crate::rate_limit::{FixedWindowLimiter, RateDecision, RateLimiter};
use crate::scheduler::OfferScheduler;
use crate::{inventory, join, queue};

/// Ticket admission engine over a transactional store.
pub struct WaitlistEngine<S: Store> {
    store: S,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn OfferScheduler>,
    limiter: Arc<dyn RateLimiter>,
    locks: EventLocks,
}

impl<S: Store> WaitlistEngine<S> {
    /// Engine on the system clock with a [`FixedWindowLimiter`] built from
    /// `config.join_rate_limit`.
    ///
    /// # Errors
    /// Returns [`WaitlistError::Configuration`] if `config` is invalid.
    pub fn new(store: S, scheduler: Arc<dyn OfferScheduler>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            offer_window_ms = config.offer_window_ms,
            join_limit = config.join_rate_limit.max_requests,
            join_window_ms = config.join_rate_limit.window_ms,
            "Waitlist engine initialised"
        );
        Ok(Self {
            store,
            limiter: Arc::new(FixedWindowLimiter::new(config.join_rate_limit)),
            config,
            clock: Arc::new(SystemClock),
            scheduler,
            locks: EventLocks::new(),
        })
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the join throttle.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn offer_window(&self) -> chrono::Duration {
        self.config.offer_window_chrono()
    }

    /// Run `f` as one transaction inside the event's critical section.
    fn mutate<T>(
        &self,
        event_id: EventId,
        f: impl FnOnce(&mut dyn Transaction) -> Result<T>,
    ) -> Result<T> {
        self.locks
            .with_event(event_id, || self.store.transaction(f))
    }

    /// Hand committed offers to the scheduler.
    fn schedule(&self, tasks: Vec<ExpiryTask>, now: DateTime<Utc>) -> usize {
        let scheduled = tasks.len();
        for task in tasks {
            let id = self.scheduler.schedule_after(task.delay_from(now), task);
            tracing::debug!(
                entry = %task.entry_id,
                event = %task.event_id,
                fire_at = %task.fire_at,
                schedule_id = id.0,
                "Expiry scheduled"
            );
        }
        scheduled
    }

    // ---- Events ----

    /// Store a new event.
    ///
    /// # Errors
    /// Returns [`WaitlistError::InvalidCapacity`] for zero capacity.
    pub fn create_event(&self, new: NewEvent) -> Result<Event> {
        let event = new.into_event(self.now())?;
        self.store.transaction(|tx| tx.insert_event(event.clone()))?;
        tracing::info!(
            event = %event.id,
            seller = %event.seller_id,
            total_tickets = event.total_tickets,
            "Event created"
        );
        Ok(event)
    }

    /// Apply a seller edit. A capacity change re-runs the Queue Processor.
    ///
    /// # Errors
    /// - [`WaitlistError::EventNotFound`]
    /// - [`WaitlistError::CapacityBelowSold`] if capacity would drop below
    ///   the tickets already sold
    /// - [`WaitlistError::CapacityBelowReserved`] if it would drop below
    ///   sold tickets plus live offers
    pub fn update_event(&self, event_id: EventId, update: EventUpdate) -> Result<Event> {
        let now = self.now();
        let window = self.offer_window();
        let capacity_changed = update.total_tickets.is_some();
        let (event, tasks) = self.mutate(event_id, |tx| {
            let mut event = tx
                .event(event_id)?
                .ok_or(WaitlistError::EventNotFound(event_id))?;
            let held = inventory::availability_of(tx, &event, now)?;
            update.apply(&mut event, held.purchased_count, held.active_offer_count)?;
            tx.put_event(event.clone())?;
            let tasks = if capacity_changed {
                queue::promote_waiting(tx, event_id, now, window)?
            } else {
                Vec::new()
            };
            Ok((event, tasks))
        })?;
        tracing::info!(event = %event_id, total_tickets = event.total_tickets, "Event updated");
        self.schedule(tasks, now);
        Ok(event)
    }

    /// # Errors
    /// Returns [`WaitlistError::EventNotFound`] if the event does not exist.
    pub fn event(&self, event_id: EventId) -> Result<Event> {
        self.store.read(|tx| {
            tx.event(event_id)?
                .ok_or(WaitlistError::EventNotFound(event_id))
        })
    }

    // ---- Inventory ----

    /// Free slots of an event right now.
    ///
    /// # Errors
    /// Returns [`WaitlistError::EventNotFound`] if the event does not exist.
    pub fn availability(&self, event_id: EventId) -> Result<Availability> {
        let now = self.now();
        self.store
            .read(|tx| inventory::availability(tx, event_id, now))
    }

    // ---- Waiting list ----

    /// Join Gate: throttle, de-duplicate, insert, then offer any free slot.
    ///
    /// # Errors
    /// - [`WaitlistError::RateLimited`] when the user's join quota is spent
    /// - [`WaitlistError::AlreadyQueued`] if the user holds a live entry
    /// - [`WaitlistError::EventNotFound`]
    pub fn join_waiting_list(&self, event_id: EventId, user_id: UserId) -> Result<JoinOutcome> {
        let now = self.now();
        if let RateDecision::Limited { retry_after } = self.limiter.try_acquire(&user_id, now) {
            let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(
                event = %event_id,
                user = %user_id,
                retry_after_ms,
                "Join rate limited"
            );
            return Err(WaitlistError::RateLimited { retry_after_ms });
        }

        let window = self.offer_window();
        let (outcome, tasks) =
            self.mutate(event_id, |tx| join::join(tx, event_id, user_id, now, window))?;
        self.schedule(tasks, now);
        Ok(outcome)
    }

    /// Queue Processor entry point. Returns the number of offers made.
    ///
    /// # Errors
    /// Returns [`WaitlistError::EventNotFound`] if the event does not exist.
    pub fn process_queue(&self, event_id: EventId) -> Result<usize> {
        let now = self.now();
        let window = self.offer_window();
        let tasks = self.mutate(event_id, |tx| {
            queue::promote_waiting(tx, event_id, now, window)
        })?;
        Ok(self.schedule(tasks, now))
    }

    /// The caller's live entry and its 1-based position, if any.
    pub fn queue_position(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<QueuePosition>> {
        self.store.read(|tx| {
            let Some(entry) = tx.live_entry(user_id, event_id)? else {
                return Ok(None);
            };
            let key = entry.queue_key();
            let ahead = tx
                .entries_for_event(event_id, None, None)?
                .iter()
                .filter(|e| e.status.is_queued() && e.queue_key() < key)
                .count();
            Ok(Some(QueuePosition {
                entry,
                position: ahead + 1,
            }))
        })
    }

    /// Every entry the user ever created, oldest first.
    pub fn user_waiting_list(&self, user_id: UserId) -> Result<Vec<WaitingListEntry>> {
        self.store.read(|tx| tx.entries_for_user(user_id))
    }

    // ---- Offer expiry ----

    /// Expiry handler. Returns `true` if an offer was flipped, `false` for
    /// the idempotent no-op.
    pub fn expire_offer(&self, entry_id: EntryId, event_id: EventId) -> Result<bool> {
        let now = self.now();
        let window = self.offer_window();
        let outcome = self.mutate(event_id, |tx| {
            expiry::expire_offer(tx, entry_id, event_id, now, window)
        })?;
        match outcome {
            ExpiryOutcome::Expired { promoted } => {
                self.schedule(promoted, now);
                Ok(true)
            }
            ExpiryOutcome::Noop => Ok(false),
        }
    }

    /// Run the expiry handler for a delivered payload.
    pub fn dispatch_expiry(&self, task: &ExpiryTask) -> Result<bool> {
        self.expire_offer(task.entry_id, task.event_id)
    }

    /// Give up an offer before its deadline.
    ///
    /// # Errors
    /// - [`WaitlistError::EntryNotFound`]
    /// - [`WaitlistError::EntryEventMismatch`]
    /// - [`WaitlistError::OfferNoLongerValid`] unless the entry is OFFERED
    pub fn release_offer(&self, event_id: EventId, entry_id: EntryId) -> Result<()> {
        let now = self.now();
        let window = self.offer_window();
        let tasks = self.mutate(event_id, |tx| {
            expiry::release(tx, event_id, entry_id, now, window)
        })?;
        self.schedule(tasks, now);
        Ok(())
    }

    /// Safety-net sweep: expire every overdue offer, one transaction and
    /// one queue run per affected event.
    ///
    /// A failing event is rolled back, logged and listed in the report;
    /// the remaining events are still swept.
    pub fn cleanup_expired_offers(&self) -> Result<SweepReport> {
        let now = self.now();
        let window = self.offer_window();
        let overdue = self.store.read(|tx| tx.overdue_offers(now))?;

        let mut by_event: BTreeMap<EventId, Vec<EntryId>> = BTreeMap::new();
        for entry in overdue {
            by_event.entry(entry.event_id).or_default().push(entry.id);
        }

        let mut report = SweepReport {
            events: by_event.len(),
            ..SweepReport::default()
        };
        for (event_id, entries) in by_event {
            let result = self.mutate(event_id, |tx| {
                expiry::expire_overdue(tx, event_id, &entries, now, window)
            });
            match result {
                Ok((expired, promoted)) => {
                    report.expired += expired;
                    report.offered += self.schedule(promoted, now);
                }
                Err(err) => {
                    tracing::warn!(event = %event_id, error = %err, "Sweep failed for event");
                    report.failed_events.push(event_id);
                }
            }
        }

        if report.expired > 0 || !report.failed_events.is_empty() {
            tracing::info!(
                events = report.events,
                expired = report.expired,
                offered = report.offered,
                failed = report.failed_events.len(),
                "Overdue offers swept"
            );
        } else {
            tracing::debug!("Sweep found no overdue offers");
        }
        Ok(report)
    }

    // ---- Purchases and tickets ----

    /// Purchase Finalizer. `payment` must already be captured and verified.
    ///
    /// When the offer turns out to be stale the queue is re-run before the
    /// error is returned, since its slot may be free.
    ///
    /// # Errors
    /// See [`purchase::purchase`] for the precondition order.
    pub fn purchase(
        &self,
        event_id: EventId,
        user_id: UserId,
        entry_id: EntryId,
        payment: PaymentInfo,
    ) -> Result<Ticket> {
        let now = self.now();
        let window = self.offer_window();
        let request = PurchaseRequest {
            event_id,
            user_id,
            entry_id,
            payment,
        };
        match self.mutate(event_id, |tx| purchase::purchase(tx, request, now, window)) {
            Ok((ticket, tasks)) => {
                self.schedule(tasks, now);
                Ok(ticket)
            }
            Err(err @ WaitlistError::OfferNoLongerValid { .. }) => {
                if let Err(queue_err) = self.process_queue(event_id) {
                    tracing::debug!(event = %event_id, error = %queue_err, "Queue re-run after stale purchase failed");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Move a ticket forward (check-in, refund, cancellation). A ticket
    /// leaving the active set frees a slot, so the queue is re-run.
    ///
    /// # Errors
    /// - [`WaitlistError::TicketNotFound`]
    /// - [`WaitlistError::InvalidTicketTransition`] for backward moves
    pub fn update_ticket_status(&self, ticket_id: TicketId, status: TicketStatus) -> Result<Ticket> {
        let event_id = self
            .store
            .read(|tx| tx.ticket(ticket_id))?
            .ok_or(WaitlistError::TicketNotFound(ticket_id))?
            .event_id;
        let now = self.now();
        let window = self.offer_window();
        let (ticket, tasks) = self.mutate(event_id, |tx| {
            let mut ticket = tx
                .ticket(ticket_id)?
                .ok_or(WaitlistError::TicketNotFound(ticket_id))?;
            let was_active = ticket.status.is_active();
            ticket.set_status(status)?;
            tx.put_ticket(ticket.clone())?;
            let tasks = if was_active && !ticket.status.is_active() {
                queue::promote_waiting(tx, event_id, now, window)?
            } else {
                Vec::new()
            };
            Ok((ticket, tasks))
        })?;
        tracing::info!(ticket = %ticket_id, event = %event_id, status = %status, "Ticket status updated");
        self.schedule(tasks, now);
        Ok(ticket)
    }

    pub fn user_tickets(&self, user_id: UserId) -> Result<Vec<Ticket>> {
        self.store.read(|tx| tx.tickets_for_user(user_id))
    }

    /// The user's VALID or USED ticket for an event, if any.
    pub fn user_ticket_for_event(&self, event_id: EventId, user_id: UserId) -> Result<Option<Ticket>> {
        self.store.read(|tx| {
            Ok(tx
                .tickets_for_user(user_id)?
                .into_iter()
                .find(|t| t.event_id == event_id && t.status.is_active()))
        })
    }

    /// VALID and USED tickets of an event, oldest purchase first.
    pub fn valid_tickets_for_event(&self, event_id: EventId) -> Result<Vec<Ticket>> {
        self.store
            .read(|tx| tx.tickets_for_event(event_id, &TicketStatus::ACTIVE))
    }

    /// A ticket with the event it belongs to, or `None` for an unknown id.
    pub fn ticket_with_details(&self, ticket_id: TicketId) -> Result<Option<TicketDetails>> {
        self.store.read(|tx| {
            let Some(ticket) = tx.ticket(ticket_id)? else {
                return Ok(None);
            };
            let event = tx.event(ticket.event_id)?;
            Ok(Some(TicketDetails { ticket, event }))
        })
    }

    /// Sales figures; revenue is sold tickets times the current price.
    ///
    /// # Errors
    /// Returns [`WaitlistError::EventNotFound`] if the event does not exist.
    pub fn event_metrics(&self, event_id: EventId) -> Result<EventMetrics> {
        self.store.read(|tx| {
            let event = tx
                .event(event_id)?
                .ok_or(WaitlistError::EventNotFound(event_id))?;
            metrics_of(tx, &event)
        })
    }

    // ---- Event listings ----

    /// Every event that is not cancelled, oldest first.
    pub fn active_events(&self) -> Result<Vec<Event>> {
        self.store.read(|tx| {
            Ok(tx
                .events()?
                .into_iter()
                .filter(|e| !e.is_cancelled)
                .collect())
        })
    }

    /// Events that are not cancelled and whose name, description or
    /// location contains `term`, ignoring case.
    pub fn search_events(&self, term: &str) -> Result<Vec<Event>> {
        Ok(self
            .active_events()?
            .into_iter()
            .filter(|e| e.matches(term))
            .collect())
    }

    /// All events owned by `seller`, cancelled ones included, each with its
    /// sales figures.
    pub fn seller_events(&self, seller: UserId) -> Result<Vec<SellerEvent>> {
        self.store.read(|tx| {
            tx.events()?
                .into_iter()
                .filter(|e| e.seller_id == seller)
                .map(|event| {
                    let metrics = metrics_of(tx, &event)?;
                    Ok(SellerEvent { event, metrics })
                })
                .collect()
        })
    }

    // ---- Cancellation ----

    /// Cancel an event with no active tickets and delete its waiting list.
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    /// - [`WaitlistError::EventNotFound`]
    /// - [`WaitlistError::HasActiveTickets`]
    pub fn cancel_event(&self, event_id: EventId) -> Result<usize> {
        self.mutate(event_id, |tx| cancellation::cancel_event(tx, event_id))
    }

    /// Refund every active ticket through `gateway`, then cancel.
    ///
    /// # Errors
    /// - [`WaitlistError::EventNotFound`]
    /// - [`WaitlistError::RefundIncomplete`] if any refund failed; the event
    ///   stays active and successful refunds are kept
    /// - [`WaitlistError::HasActiveTickets`] if a ticket was sold meanwhile
    pub fn refund_and_cancel_event(
        &self,
        event_id: EventId,
        gateway: &dyn RefundGateway,
    ) -> Result<RefundReport> {
        let tickets = self.store.read(|tx| {
            tx.event(event_id)?
                .ok_or(WaitlistError::EventNotFound(event_id))?;
            tx.tickets_for_event(event_id, &TicketStatus::ACTIVE)
        })?;

        let mut refunded = 0;
        let mut failures = Vec::new();
        for ticket in &tickets {
            if let Err(reason) = gateway.refund(ticket) {
                tracing::warn!(event = %event_id, ticket = %ticket.id, %reason, "Refund failed");
                failures.push(RefundFailure {
                    ticket_id: ticket.id,
                    reason,
                });
                continue;
            }
            match self.mutate(event_id, |tx| cancellation::mark_refunded(tx, ticket.id)) {
                Ok(_) => refunded += 1,
                Err(err) => failures.push(RefundFailure {
                    ticket_id: ticket.id,
                    reason: format!("refunded by gateway but not recorded: {err}"),
                }),
            }
        }

        if !failures.is_empty() {
            // The event stays open, so slots freed by the refunds that went
            // through go to the waiting list.
            if refunded > 0 {
                if let Err(err) = self.process_queue(event_id) {
                    tracing::warn!(
                        event = %event_id,
                        error = %err,
                        "Queue re-run after partial refund failed"
                    );
                }
            }
            tracing::warn!(
                event = %event_id,
                refunded,
                failed = failures.len(),
                "Refund incomplete, event left active"
            );
            return Err(WaitlistError::RefundIncomplete {
                event: event_id,
                refunded,
                failures,
            });
        }

        let entries_removed = self.cancel_event(event_id)?;
        tracing::info!(event = %event_id, refunded, entries_removed, "Event refunded and cancelled");
        Ok(RefundReport {
            refunded,
            entries_removed,
        })
    }
}

fn metrics_of(tx: &dyn Transaction, event: &Event) -> Result<EventMetrics> {
    let tickets = tx.tickets_for_event(event.id, &[])?;
    let count = |status: &[TicketStatus]| {
        let n = tickets.iter().filter(|t| status.contains(&t.status)).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    };
    let sold_tickets = count(&TicketStatus::ACTIVE);
    Ok(EventMetrics {
        sold_tickets,
        refunded_tickets: count(&[TicketStatus::Refunded]),
        cancelled_tickets: count(&[TicketStatus::Cancelled]),
        revenue: event.price * Decimal::from(sold_tickets),
    })
}
