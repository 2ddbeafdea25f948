//! End-to-end scenarios through the public engine API, driven by a manual
//! clock and a pull-based scheduler.

use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use waitlist_engine::{ManualScheduler, RefundGateway, Unlimited, WaitlistEngine};
use waitlist_store::{MemoryStore, Store};
use waitlist_types::{
    Clock, EngineConfig, EntryId, EntryStatus, EventId, EventUpdate, ExpiryTask, ManualClock,
    NewEvent, PaymentInfo, Ticket, TicketId, TicketStatus, UserId, WaitingListEntry,
    WaitlistError,
};

struct Harness {
    engine: WaitlistEngine<MemoryStore>,
    clock: Arc<ManualClock>,
    scheduler: Arc<ManualScheduler>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = WaitlistEngine::new(
            MemoryStore::new(),
            scheduler.clone(),
            EngineConfig::default(),
        )
        .unwrap()
        .with_clock(clock.clone())
        .with_rate_limiter(Arc::new(Unlimited));
        Self {
            engine,
            clock,
            scheduler,
        }
    }

    fn event(&self, capacity: u32) -> EventId {
        self.engine.create_event(NewEvent::dummy(capacity)).unwrap().id
    }

    /// Deliver every due expiry payload once.
    fn fire_due(&self) -> Vec<ExpiryTask> {
        let due = self.scheduler.take_due(self.clock.now());
        for task in &due {
            self.engine.dispatch_expiry(task).unwrap();
        }
        due
    }

    fn status(&self, entry_id: EntryId) -> EntryStatus {
        self.engine
            .store()
            .read(|tx| tx.entry(entry_id))
            .unwrap()
            .unwrap()
            .status
    }

    fn buy(&self, event_id: EventId, user: UserId, entry_id: EntryId) -> Ticket {
        self.engine
            .purchase(event_id, user, entry_id, payment())
            .unwrap()
    }
}

fn payment() -> PaymentInfo {
    PaymentInfo::new("pi_test", Decimal::new(2500, 2))
}

// -----------------------------------------------------------------------------
// Scenarios
// -----------------------------------------------------------------------------

#[test]
fn expired_offer_passes_to_next_in_line() {
    let h = Harness::new();
    let event_id = h.event(1);
    let (a, b) = (UserId::new(), UserId::new());

    let a_join = h.engine.join_waiting_list(event_id, a).unwrap();
    assert_eq!(a_join.status, EntryStatus::Offered);

    let b_join = h.engine.join_waiting_list(event_id, b).unwrap();
    assert_eq!(b_join.status, EntryStatus::Waiting);
    let b_pos = h.engine.queue_position(event_id, b).unwrap().unwrap();
    assert_eq!(b_pos.position, 2, "A's live offer is ahead of B");

    h.clock.advance(Duration::minutes(15));
    let fired = h.fire_due();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].entry_id, a_join.entry_id);

    assert_eq!(h.status(a_join.entry_id), EntryStatus::Expired);
    assert_eq!(h.status(b_join.entry_id), EntryStatus::Offered);
    let b_pos = h.engine.queue_position(event_id, b).unwrap().unwrap();
    assert_eq!(b_pos.position, 1);
}

#[test]
fn sold_out_event_queues_new_joiners() {
    let h = Harness::new();
    let event_id = h.event(2);
    for _ in 0..2 {
        let user = UserId::new();
        let offer = h.engine.join_waiting_list(event_id, user).unwrap();
        h.buy(event_id, user, offer.entry_id);
    }

    let c = h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    assert_eq!(c.status, EntryStatus::Waiting);

    let availability = h.engine.availability(event_id).unwrap();
    assert!(availability.is_sold_out);
    assert_eq!(availability.remaining_tickets(), 0);
    assert_eq!(availability.purchased_count, 2);
}

#[test]
fn purchase_with_expired_entry_is_refused() {
    let h = Harness::new();
    let event_id = h.event(1);
    let user = UserId::new();
    let offer = h.engine.join_waiting_list(event_id, user).unwrap();

    h.clock.advance(Duration::minutes(20));
    h.fire_due();
    assert_eq!(h.status(offer.entry_id), EntryStatus::Expired);

    let err = h
        .engine
        .purchase(event_id, user, offer.entry_id, payment())
        .unwrap_err();
    assert!(matches!(
        err,
        WaitlistError::OfferNoLongerValid {
            status: EntryStatus::Expired,
            ..
        }
    ));
    assert!(h.engine.user_tickets(user).unwrap().is_empty());
}

#[test]
fn cancel_with_valid_ticket_is_refused() {
    let h = Harness::new();
    let event_id = h.event(3);
    let user = UserId::new();
    let offer = h.engine.join_waiting_list(event_id, user).unwrap();
    h.buy(event_id, user, offer.entry_id);

    let err = h.engine.cancel_event(event_id).unwrap_err();
    assert!(matches!(err, WaitlistError::HasActiveTickets { count: 1, .. }));
    assert!(!h.engine.event(event_id).unwrap().is_cancelled);
}

#[test]
fn cancel_deletes_pending_entries() {
    let h = Harness::new();
    let event_id = h.event(2);
    let now = h.clock.now();
    let pending = [
        WaitingListEntry::new(event_id, UserId::new(), now),
        WaitingListEntry::new(event_id, UserId::new(), now),
    ];
    h.engine
        .store()
        .transaction(|tx| {
            for entry in &pending {
                tx.insert_entry(entry.clone())?;
            }
            Ok(())
        })
        .unwrap();

    let removed = h.engine.cancel_event(event_id).unwrap();
    assert_eq!(removed, 2);
    assert!(h.engine.event(event_id).unwrap().is_cancelled);
    assert_eq!(h.engine.store().entry_count(), 0);
}

// -----------------------------------------------------------------------------
// Properties on fixed sequences
// -----------------------------------------------------------------------------

#[test]
fn second_join_while_live_is_refused() {
    let h = Harness::new();
    let event_id = h.event(1);
    let user = UserId::new();
    h.engine.join_waiting_list(event_id, user).unwrap();
    let err = h.engine.join_waiting_list(event_id, user).unwrap_err();
    assert!(matches!(err, WaitlistError::AlreadyQueued { .. }));

    // Once the offer lapses the user may queue again with a fresh entry.
    h.clock.advance(Duration::minutes(15));
    h.fire_due();
    let again = h.engine.join_waiting_list(event_id, user).unwrap();
    assert_eq!(again.status, EntryStatus::Offered);
    assert_eq!(h.engine.user_waiting_list(user).unwrap().len(), 2);
}

#[test]
fn redelivered_expiry_changes_nothing() {
    let h = Harness::new();
    let event_id = h.event(1);
    h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    h.engine.join_waiting_list(event_id, UserId::new()).unwrap();

    h.clock.advance(Duration::minutes(15));
    let fired = h.fire_due();
    let snapshot = h
        .engine
        .store()
        .read(|tx| tx.entries_for_event(event_id, None, None))
        .unwrap();
    let pending_before = h.scheduler.len();

    for task in &fired {
        assert!(!h.engine.dispatch_expiry(task).unwrap());
    }
    let after = h
        .engine
        .store()
        .read(|tx| tx.entries_for_event(event_id, None, None))
        .unwrap();
    assert_eq!(snapshot, after);
    assert_eq!(h.scheduler.len(), pending_before);
}

#[test]
fn late_timer_after_purchase_is_absorbed() {
    let h = Harness::new();
    let event_id = h.event(1);
    let user = UserId::new();
    let offer = h.engine.join_waiting_list(event_id, user).unwrap();
    h.buy(event_id, user, offer.entry_id);

    h.clock.advance(Duration::minutes(15));
    let fired = h.fire_due();
    assert_eq!(fired.len(), 1);
    assert_eq!(h.status(offer.entry_id), EntryStatus::Purchased);
    assert_eq!(h.engine.availability(event_id).unwrap().purchased_count, 1);
}

#[test]
fn terminal_entries_never_move() {
    let h = Harness::new();
    let event_id = h.event(1);
    let user = UserId::new();
    let offer = h.engine.join_waiting_list(event_id, user).unwrap();
    h.engine.release_offer(event_id, offer.entry_id).unwrap();
    assert_eq!(h.status(offer.entry_id), EntryStatus::Expired);

    assert!(h.engine.release_offer(event_id, offer.entry_id).is_err());
    assert!(
        h.engine
            .purchase(event_id, user, offer.entry_id, payment())
            .is_err()
    );
    assert!(!h.engine.expire_offer(offer.entry_id, event_id).unwrap());
    assert_eq!(h.status(offer.entry_id), EntryStatus::Expired);
}

#[test]
fn release_hands_slot_to_next_waiter() {
    let h = Harness::new();
    let event_id = h.event(1);
    let a = h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    let b = h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    h.engine.release_offer(event_id, a.entry_id).unwrap();
    assert_eq!(h.status(b.entry_id), EntryStatus::Offered);
    // a's original timer plus b's new one
    assert_eq!(h.scheduler.len(), 2);
}

#[test]
fn waiters_are_offered_in_join_order() {
    let h = Harness::new();
    let event_id = h.event(1);
    let first = h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    let joins: Vec<_> = (0..4)
        .map(|_| {
            h.clock.advance(Duration::seconds(1));
            h.engine.join_waiting_list(event_id, UserId::new()).unwrap()
        })
        .collect();

    let mut current = first.entry_id;
    for next in &joins {
        h.engine.release_offer(event_id, current).unwrap();
        assert_eq!(h.status(next.entry_id), EntryStatus::Offered);
        current = next.entry_id;
    }
}

#[test]
fn positions_count_live_entries_ahead() {
    let h = Harness::new();
    let event_id = h.event(1);
    let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();
    for user in &users {
        h.engine.join_waiting_list(event_id, *user).unwrap();
    }
    for (i, user) in users.iter().enumerate() {
        let pos = h.engine.queue_position(event_id, *user).unwrap().unwrap();
        assert_eq!(pos.position, i + 1);
    }
    assert!(
        h.engine
            .queue_position(event_id, UserId::new())
            .unwrap()
            .is_none()
    );
}

// -----------------------------------------------------------------------------
// Safety-net sweep
// -----------------------------------------------------------------------------

#[test]
fn sweep_recovers_lost_timers() {
    let h = Harness::new();
    let event_a = h.event(1);
    let event_b = h.event(1);
    for event_id in [event_a, event_b] {
        h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
        h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    }

    // Timers never delivered.
    h.clock.advance(Duration::minutes(16));
    let lost = h.scheduler.take_due(h.clock.now());
    assert_eq!(lost.len(), 2);

    let report = h.engine.cleanup_expired_offers().unwrap();
    assert_eq!(report.events, 2);
    assert_eq!(report.expired, 2);
    assert_eq!(report.offered, 2);
    assert!(report.failed_events.is_empty());

    // Late delivery of the lost payloads is harmless.
    for task in &lost {
        assert!(!h.engine.dispatch_expiry(task).unwrap());
    }
    let idle = h.engine.cleanup_expired_offers().unwrap();
    assert_eq!(idle.expired, 0);
}

// -----------------------------------------------------------------------------
// Cancellation and refunds
// -----------------------------------------------------------------------------

/// Gateway that fails for a fixed set of tickets and records every call.
#[derive(Default)]
struct FlakyGateway {
    failing: Vec<TicketId>,
    calls: Mutex<Vec<TicketId>>,
}

impl RefundGateway for FlakyGateway {
    fn refund(&self, ticket: &Ticket) -> Result<(), String> {
        self.calls.lock().push(ticket.id);
        if self.failing.contains(&ticket.id) {
            Err("gateway timeout".to_string())
        } else {
            Ok(())
        }
    }
}

#[test]
fn partial_refund_failure_keeps_event_active() {
    let h = Harness::new();
    let event_id = h.event(2);
    let tickets: Vec<Ticket> = (0..2)
        .map(|_| {
            let user = UserId::new();
            let offer = h.engine.join_waiting_list(event_id, user).unwrap();
            h.buy(event_id, user, offer.entry_id)
        })
        .collect();

    let gateway = FlakyGateway {
        failing: vec![tickets[1].id],
        ..FlakyGateway::default()
    };
    let err = h
        .engine
        .refund_and_cancel_event(event_id, &gateway)
        .unwrap_err();
    let WaitlistError::RefundIncomplete {
        refunded, failures, ..
    } = err
    else {
        panic!("expected RefundIncomplete");
    };
    assert_eq!(refunded, 1);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].ticket_id, tickets[1].id);
    assert_eq!(failures[0].reason, "gateway timeout");
    assert_eq!(gateway.calls.lock().len(), 2);
    assert!(!h.engine.event(event_id).unwrap().is_cancelled);

    // The successful refund is kept; the retry only touches the rest.
    let metrics = h.engine.event_metrics(event_id).unwrap();
    assert_eq!(metrics.refunded_tickets, 1);
    assert_eq!(metrics.sold_tickets, 1);

    let retry = FlakyGateway::default();
    let report = h.engine.refund_and_cancel_event(event_id, &retry).unwrap();
    assert_eq!(report.refunded, 1);
    assert_eq!(*retry.calls.lock(), vec![tickets[1].id]);
    assert!(h.engine.event(event_id).unwrap().is_cancelled);
}

#[test]
fn partial_refund_offers_freed_slots_to_waiters() {
    let h = Harness::new();
    let event_id = h.event(2);
    let tickets: Vec<Ticket> = (0..2)
        .map(|_| {
            let user = UserId::new();
            let offer = h.engine.join_waiting_list(event_id, user).unwrap();
            h.buy(event_id, user, offer.entry_id)
        })
        .collect();
    let waiter = h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    assert_eq!(waiter.status, EntryStatus::Waiting);

    let gateway = FlakyGateway {
        failing: vec![tickets[1].id],
        ..FlakyGateway::default()
    };
    assert!(h.engine.refund_and_cancel_event(event_id, &gateway).is_err());

    assert!(!h.engine.event(event_id).unwrap().is_cancelled);
    assert_eq!(h.status(waiter.entry_id), EntryStatus::Offered);
    let availability = h.engine.availability(event_id).unwrap();
    assert_eq!(availability.purchased_count, 1);
    assert_eq!(availability.active_offer_count, 1);
    assert_eq!(availability.free_slots, 0);
    assert!(
        h.scheduler
            .pending()
            .iter()
            .any(|task| task.entry_id == waiter.entry_id)
    );
}

#[test]
fn capacity_cut_cannot_strand_live_offers() {
    let h = Harness::new();
    let event_id = h.event(2);
    let a = UserId::new();
    let b = UserId::new();
    let offer_a = h.engine.join_waiting_list(event_id, a).unwrap();
    let offer_b = h.engine.join_waiting_list(event_id, b).unwrap();
    assert_eq!(offer_a.status, EntryStatus::Offered);
    assert_eq!(offer_b.status, EntryStatus::Offered);

    let cut = EventUpdate {
        total_tickets: Some(1),
        ..EventUpdate::default()
    };
    let err = h.engine.update_event(event_id, cut.clone()).unwrap_err();
    assert!(matches!(
        err,
        WaitlistError::CapacityBelowReserved {
            requested: 1,
            sold: 0,
            offered: 2
        }
    ));
    assert_eq!(h.engine.event(event_id).unwrap().total_tickets, 2);

    h.buy(event_id, a, offer_a.entry_id);
    h.buy(event_id, b, offer_b.entry_id);
    let availability = h.engine.availability(event_id).unwrap();
    assert_eq!(availability.purchased_count, 2);
    assert!(availability.purchased_count <= availability.total_tickets);

    // Once B's offer lapses unbought the cut goes through.
    let h = Harness::new();
    let event_id = h.event(2);
    let offer_a = h.engine.join_waiting_list(event_id, a).unwrap();
    h.engine.join_waiting_list(event_id, b).unwrap();
    h.buy(event_id, a, offer_a.entry_id);
    h.clock.advance(Duration::minutes(15));
    h.fire_due();
    assert_eq!(h.engine.update_event(event_id, cut).unwrap().total_tickets, 1);
}

#[test]
fn refund_and_cancel_without_tickets_just_cancels() {
    let h = Harness::new();
    let event_id = h.event(1);
    h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    let report = h
        .engine
        .refund_and_cancel_event(event_id, &FlakyGateway::default())
        .unwrap();
    assert_eq!(report.refunded, 0);
    assert_eq!(report.entries_removed, 1);
}

#[test]
fn cancelled_event_admits_nobody() {
    let h = Harness::new();
    let event_id = h.event(5);
    h.engine.cancel_event(event_id).unwrap();

    let late = h.engine.join_waiting_list(event_id, UserId::new()).unwrap();
    assert_eq!(late.status, EntryStatus::Waiting);
    let availability = h.engine.availability(event_id).unwrap();
    assert_eq!(availability.free_slots, 0);
    assert!(availability.is_sold_out);
    assert_eq!(h.engine.process_queue(event_id).unwrap(), 0);
}

#[test]
fn refunded_ticket_stays_in_history() {
    let h = Harness::new();
    let event_id = h.event(1);
    let user = UserId::new();
    let offer = h.engine.join_waiting_list(event_id, user).unwrap();
    let ticket = h.buy(event_id, user, offer.entry_id);
    h.engine
        .update_ticket_status(ticket.id, TicketStatus::Refunded)
        .unwrap();

    assert!(h.engine.user_ticket_for_event(event_id, user).unwrap().is_none());
    let history = h.engine.user_tickets(user).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TicketStatus::Refunded);
}

#[test]
fn unknown_ids_surface_as_not_found() {
    let h = Harness::new();
    let missing_event = EventId::new();
    assert!(matches!(
        h.engine.join_waiting_list(missing_event, UserId::new()),
        Err(WaitlistError::EventNotFound(_))
    ));
    assert!(matches!(
        h.engine.availability(missing_event),
        Err(WaitlistError::EventNotFound(_))
    ));
    assert!(matches!(
        h.engine.cancel_event(missing_event),
        Err(WaitlistError::EventNotFound(_))
    ));
    let event_id = h.event(1);
    assert!(matches!(
        h.engine
            .purchase(event_id, UserId::new(), EntryId::new(), payment()),
        Err(WaitlistError::EntryNotFound(_))
    ));
    assert!(matches!(
        h.engine.release_offer(event_id, EntryId::new()),
        Err(WaitlistError::EntryNotFound(_))
    ));
}

// -----------------------------------------------------------------------------
// Listings and ticket lookups
// -----------------------------------------------------------------------------

fn listed(h: &Harness, seller: UserId, name: &str, location: &str) -> EventId {
    let new = NewEvent {
        seller_id: seller,
        name: name.to_string(),
        location: location.to_string(),
        ..NewEvent::dummy(2)
    };
    h.engine.create_event(new).unwrap().id
}

#[test]
fn listings_hide_cancelled_events() {
    let h = Harness::new();
    let seller = UserId::new();
    let jazz = listed(&h, seller, "Jazz Night", "Blue Room");
    let rock = listed(&h, seller, "Rock Festival", "Open Air Park");
    let gone = listed(&h, seller, "Jazz Brunch", "Cafe");
    h.engine.cancel_event(gone).unwrap();

    let active: Vec<EventId> = h.engine.active_events().unwrap().iter().map(|e| e.id).collect();
    assert_eq!(active, vec![jazz, rock]);

    let hits: Vec<EventId> = h
        .engine
        .search_events("JAZZ")
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(hits, vec![jazz]);
    let by_location = h.engine.search_events("open air").unwrap();
    assert_eq!(by_location.len(), 1);
    assert_eq!(by_location[0].id, rock);
    assert!(h.engine.search_events("opera").unwrap().is_empty());
}

#[test]
fn seller_sees_own_events_with_metrics() {
    let h = Harness::new();
    let seller = UserId::new();
    let mine = listed(&h, seller, "Jazz Night", "Blue Room");
    let cancelled = listed(&h, seller, "Jazz Brunch", "Cafe");
    h.engine.cancel_event(cancelled).unwrap();
    listed(&h, UserId::new(), "Someone Else", "Elsewhere");

    let buyer = UserId::new();
    let offer = h.engine.join_waiting_list(mine, buyer).unwrap();
    h.buy(mine, buyer, offer.entry_id);

    let events = h.engine.seller_events(seller).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event.id, mine);
    assert_eq!(events[0].metrics.sold_tickets, 1);
    assert_eq!(events[0].metrics.revenue, Decimal::new(2500, 2));
    assert_eq!(events[1].event.id, cancelled);
    assert!(events[1].event.is_cancelled);
    assert_eq!(events[1].metrics.sold_tickets, 0);
}

#[test]
fn valid_tickets_exclude_refunds() {
    let h = Harness::new();
    let event_id = h.event(3);
    let tickets: Vec<Ticket> = (0..3)
        .map(|_| {
            let user = UserId::new();
            let offer = h.engine.join_waiting_list(event_id, user).unwrap();
            h.buy(event_id, user, offer.entry_id)
        })
        .collect();
    h.engine
        .update_ticket_status(tickets[0].id, TicketStatus::Refunded)
        .unwrap();
    h.engine
        .update_ticket_status(tickets[1].id, TicketStatus::Used)
        .unwrap();

    let valid: Vec<TicketId> = h
        .engine
        .valid_tickets_for_event(event_id)
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(valid, vec![tickets[1].id, tickets[2].id]);
}

#[test]
fn ticket_details_carry_the_event() {
    let h = Harness::new();
    let event_id = h.event(1);
    let user = UserId::new();
    let offer = h.engine.join_waiting_list(event_id, user).unwrap();
    let ticket = h.buy(event_id, user, offer.entry_id);

    let details = h.engine.ticket_with_details(ticket.id).unwrap().unwrap();
    assert_eq!(details.ticket, ticket);
    assert_eq!(details.event.map(|e| e.id), Some(event_id));
    assert!(h.engine.ticket_with_details(TicketId::new()).unwrap().is_none());
}
