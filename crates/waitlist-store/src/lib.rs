//! # waitlist-store
//!
//! The storage collaborator of the waiting-list engine.
//!
//! The engine never holds queue state in process memory; it reads and
//! writes three logical collections (events, tickets, waiting-list entries)
//! through a [`Store`] that runs closures as serializable transactions:
//!
//! ```text
//!   store.transaction(|tx| {
//!       let free = availability(tx, event, now)?;   // read
//!       for entry in tx.entries_for_event(..)? {   // read
//!           tx.put_entry(offered)?;                  // write
//!       }
//!       Ok(..)
//!   })                                               // commit, or roll back on Err
//! ```
//!
//! Reads that feed a write inside the same closure see a consistent
//! snapshot, and a closure that returns `Err` leaves no partial writes.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! single-node deployments.

pub mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use waitlist_types::{
    EntryId, EntryStatus, Event, EventId, Result, Ticket, TicketId, TicketStatus, UserId,
    WaitingListEntry,
};

/// Operations available inside one transaction.
///
/// `insert_*` fails if the id already exists, `put_*` and `delete_*` fail if
/// it does not. Both report [`waitlist_types::WaitlistError::Storage`]; the
/// engine checks existence itself and maps absence to domain errors first.
pub trait Transaction {
    // ---- Events ----

    fn event(&self, id: EventId) -> Result<Option<Event>>;

    fn insert_event(&mut self, event: Event) -> Result<()>;

    fn put_event(&mut self, event: Event) -> Result<()>;

    /// Every stored event, cancelled ones included, oldest first.
    fn events(&self) -> Result<Vec<Event>>;

    // ---- Tickets ----

    fn ticket(&self, id: TicketId) -> Result<Option<Ticket>>;

    fn insert_ticket(&mut self, ticket: Ticket) -> Result<()>;

    fn put_ticket(&mut self, ticket: Ticket) -> Result<()>;

    /// Tickets of `event` whose status is in `statuses`, oldest purchase
    /// first. An empty `statuses` slice matches every status.
    fn tickets_for_event(&self, event: EventId, statuses: &[TicketStatus]) -> Result<Vec<Ticket>>;

    /// All tickets bought by `user`, oldest purchase first.
    fn tickets_for_user(&self, user: UserId) -> Result<Vec<Ticket>>;

    // ---- Waiting-list entries ----

    fn entry(&self, id: EntryId) -> Result<Option<WaitingListEntry>>;

    fn insert_entry(&mut self, entry: WaitingListEntry) -> Result<()>;

    fn put_entry(&mut self, entry: WaitingListEntry) -> Result<()>;

    fn delete_entry(&mut self, id: EntryId) -> Result<()>;

    /// The user's non-expired entry for `event`, if any.
    fn live_entry(&self, user: UserId, event: EventId) -> Result<Option<WaitingListEntry>>;

    /// Entries of `event` in FIFO order (`created_at`, then id), optionally
    /// filtered by status and truncated to `limit`.
    fn entries_for_event(
        &self,
        event: EventId,
        status: Option<EntryStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<WaitingListEntry>>;

    /// All entries of `user`, oldest first.
    fn entries_for_user(&self, user: UserId) -> Result<Vec<WaitingListEntry>>;

    /// OFFERED entries across all events whose deadline is `<= now`.
    fn overdue_offers(&self, now: DateTime<Utc>) -> Result<Vec<WaitingListEntry>>;

    /// Number of tickets of `event` with a status in `statuses`.
    fn count_tickets(&self, event: EventId, statuses: &[TicketStatus]) -> Result<usize> {
        Ok(self.tickets_for_event(event, statuses)?.len())
    }
}

/// A transactional store of events, tickets and waiting-list entries.
pub trait Store: Send + Sync {
    /// Run `f` as one serializable read-write transaction.
    ///
    /// Writes made by `f` become visible atomically when it returns `Ok`
    /// and are discarded when it returns `Err`.
    ///
    /// # Errors
    /// Propagates the error returned by `f`, or a storage failure.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>;

    /// Run `f` against a consistent read-only snapshot.
    ///
    /// # Errors
    /// Propagates the error returned by `f`, or a storage failure.
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>;
}
