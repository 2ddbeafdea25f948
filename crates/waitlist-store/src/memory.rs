//! In-memory [`Store`] implementation.
//!
//! All tables sit behind one `parking_lot::Mutex`, so transactions are
//! serializable. Each write records the overwritten row in an undo log;
//! when the transaction closure fails the log is replayed in reverse and
//! the tables (including secondary indexes) return to their prior state.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use waitlist_types::{
    EntryId, EntryStatus, Event, EventId, Result, Ticket, TicketId, TicketStatus, UserId,
    WaitingListEntry, WaitlistError,
};

use crate::{Store, Transaction};

type EntryKey = (DateTime<Utc>, EntryId);
type TicketKey = (DateTime<Utc>, TicketId);

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    tickets: HashMap<TicketId, Ticket>,
    entries: HashMap<EntryId, WaitingListEntry>,
    /// FIFO order per event.
    entries_by_event: HashMap<EventId, BTreeSet<EntryKey>>,
    entries_by_user: HashMap<UserId, BTreeSet<EntryKey>>,
    tickets_by_event: HashMap<EventId, BTreeSet<TicketKey>>,
    tickets_by_user: HashMap<UserId, BTreeSet<TicketKey>>,
}

impl Tables {
    /// Swap the row stored under `id` for `event`, returning the old row.
    fn replace_event(&mut self, id: EventId, event: Option<Event>) -> Option<Event> {
        match event {
            Some(event) => self.events.insert(id, event),
            None => self.events.remove(&id),
        }
    }

    fn replace_ticket(&mut self, id: TicketId, ticket: Option<Ticket>) -> Option<Ticket> {
        let previous = self.tickets.remove(&id);
        if let Some(old) = &previous {
            let key = (old.purchased_at, old.id);
            unindex(&mut self.tickets_by_event, &old.event_id, &key);
            unindex(&mut self.tickets_by_user, &old.user_id, &key);
        }
        if let Some(ticket) = ticket {
            let key = (ticket.purchased_at, ticket.id);
            self.tickets_by_event
                .entry(ticket.event_id)
                .or_default()
                .insert(key);
            self.tickets_by_user
                .entry(ticket.user_id)
                .or_default()
                .insert(key);
            self.tickets.insert(id, ticket);
        }
        previous
    }

    fn replace_entry(
        &mut self,
        id: EntryId,
        entry: Option<WaitingListEntry>,
    ) -> Option<WaitingListEntry> {
        let previous = self.entries.remove(&id);
        if let Some(old) = &previous {
            let key = old.queue_key();
            unindex(&mut self.entries_by_event, &old.event_id, &key);
            unindex(&mut self.entries_by_user, &old.user_id, &key);
        }
        if let Some(entry) = entry {
            let key = entry.queue_key();
            self.entries_by_event
                .entry(entry.event_id)
                .or_default()
                .insert(key);
            self.entries_by_user
                .entry(entry.user_id)
                .or_default()
                .insert(key);
            self.entries.insert(id, entry);
        }
        previous
    }

    fn tickets_at(&self, keys: Option<&BTreeSet<TicketKey>>) -> impl Iterator<Item = &Ticket> {
        keys.into_iter()
            .flatten()
            .filter_map(|(_, id)| self.tickets.get(id))
    }

    fn entries_at(
        &self,
        keys: Option<&BTreeSet<EntryKey>>,
    ) -> impl Iterator<Item = &WaitingListEntry> {
        keys.into_iter()
            .flatten()
            .filter_map(|(_, id)| self.entries.get(id))
    }
}

fn unindex<K: Eq + Hash, V: Ord>(index: &mut HashMap<K, BTreeSet<V>>, owner: &K, key: &V) {
    if let Some(keys) = index.get_mut(owner) {
        keys.remove(key);
        if keys.is_empty() {
            index.remove(owner);
        }
    }
}

fn duplicate(kind: &str, id: impl fmt::Display) -> WaitlistError {
    WaitlistError::Storage(format!("duplicate {kind} {id}"))
}

fn missing(kind: &str, id: impl fmt::Display) -> WaitlistError {
    WaitlistError::Storage(format!("no such {kind} {id}"))
}

/// The prior value of one row written inside a transaction.
enum Undo {
    Event(EventId, Option<Event>),
    Ticket(TicketId, Option<Ticket>),
    Entry(EntryId, Option<WaitingListEntry>),
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
}

impl<'a> MemoryTx<'a> {
    fn new(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            undo: Vec::new(),
        }
    }

    /// Undo every write in reverse order. Returns the number of writes undone.
    fn rollback(self) -> usize {
        let Self { tables, undo } = self;
        let undone = undo.len();
        for step in undo.into_iter().rev() {
            match step {
                Undo::Event(id, prior) => {
                    tables.replace_event(id, prior);
                }
                Undo::Ticket(id, prior) => {
                    tables.replace_ticket(id, prior);
                }
                Undo::Entry(id, prior) => {
                    tables.replace_entry(id, prior);
                }
            }
        }
        undone
    }
}

impl Transaction for MemoryTx<'_> {
    fn event(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.tables.events.get(&id).cloned())
    }

    fn insert_event(&mut self, event: Event) -> Result<()> {
        let id = event.id;
        if self.tables.events.contains_key(&id) {
            return Err(duplicate("event", id));
        }
        let prior = self.tables.replace_event(id, Some(event));
        self.undo.push(Undo::Event(id, prior));
        Ok(())
    }

    fn put_event(&mut self, event: Event) -> Result<()> {
        let id = event.id;
        if !self.tables.events.contains_key(&id) {
            return Err(missing("event", id));
        }
        let prior = self.tables.replace_event(id, Some(event));
        self.undo.push(Undo::Event(id, prior));
        Ok(())
    }

    fn events(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self.tables.events.values().cloned().collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        Ok(events)
    }

    fn ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        Ok(self.tables.tickets.get(&id).cloned())
    }

    fn insert_ticket(&mut self, ticket: Ticket) -> Result<()> {
        let id = ticket.id;
        if self.tables.tickets.contains_key(&id) {
            return Err(duplicate("ticket", id));
        }
        let prior = self.tables.replace_ticket(id, Some(ticket));
        self.undo.push(Undo::Ticket(id, prior));
        Ok(())
    }

    fn put_ticket(&mut self, ticket: Ticket) -> Result<()> {
        let id = ticket.id;
        if !self.tables.tickets.contains_key(&id) {
            return Err(missing("ticket", id));
        }
        let prior = self.tables.replace_ticket(id, Some(ticket));
        self.undo.push(Undo::Ticket(id, prior));
        Ok(())
    }

    fn tickets_for_event(&self, event: EventId, statuses: &[TicketStatus]) -> Result<Vec<Ticket>> {
        Ok(self
            .tables
            .tickets_at(self.tables.tickets_by_event.get(&event))
            .filter(|t| statuses.is_empty() || statuses.contains(&t.status))
            .cloned()
            .collect())
    }

    fn tickets_for_user(&self, user: UserId) -> Result<Vec<Ticket>> {
        Ok(self
            .tables
            .tickets_at(self.tables.tickets_by_user.get(&user))
            .cloned()
            .collect())
    }

    fn entry(&self, id: EntryId) -> Result<Option<WaitingListEntry>> {
        Ok(self.tables.entries.get(&id).cloned())
    }

    fn insert_entry(&mut self, entry: WaitingListEntry) -> Result<()> {
        let id = entry.id;
        if self.tables.entries.contains_key(&id) {
            return Err(duplicate("waiting list entry", id));
        }
        let prior = self.tables.replace_entry(id, Some(entry));
        self.undo.push(Undo::Entry(id, prior));
        Ok(())
    }

    fn put_entry(&mut self, entry: WaitingListEntry) -> Result<()> {
        let id = entry.id;
        if !self.tables.entries.contains_key(&id) {
            return Err(missing("waiting list entry", id));
        }
        let prior = self.tables.replace_entry(id, Some(entry));
        self.undo.push(Undo::Entry(id, prior));
        Ok(())
    }

    fn delete_entry(&mut self, id: EntryId) -> Result<()> {
        let prior = self.tables.replace_entry(id, None);
        if prior.is_none() {
            return Err(missing("waiting list entry", id));
        }
        self.undo.push(Undo::Entry(id, prior));
        Ok(())
    }

    fn live_entry(&self, user: UserId, event: EventId) -> Result<Option<WaitingListEntry>> {
        Ok(self
            .tables
            .entries_at(self.tables.entries_by_user.get(&user))
            .find(|e| e.event_id == event && e.status.is_live())
            .cloned())
    }

    fn entries_for_event(
        &self,
        event: EventId,
        status: Option<EntryStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<WaitingListEntry>> {
        Ok(self
            .tables
            .entries_at(self.tables.entries_by_event.get(&event))
            .filter(|e| status.is_none_or(|s| e.status == s))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn entries_for_user(&self, user: UserId) -> Result<Vec<WaitingListEntry>> {
        Ok(self
            .tables
            .entries_at(self.tables.entries_by_user.get(&user))
            .cloned()
            .collect())
    }

    fn overdue_offers(&self, now: DateTime<Utc>) -> Result<Vec<WaitingListEntry>> {
        let mut overdue: Vec<WaitingListEntry> = self
            .tables
            .entries
            .values()
            .filter(|e| {
                e.status == EntryStatus::Offered && e.offer_expires_at.is_some_and(|d| d <= now)
            })
            .cloned()
            .collect();
        overdue.sort_by_key(WaitingListEntry::queue_key);
        Ok(overdue)
    }
}

/// Serializable in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn event_count(&self) -> usize {
        self.tables.lock().events.len()
    }

    /// Number of stored tickets.
    pub fn ticket_count(&self) -> usize {
        self.tables.lock().tickets.len()
    }

    /// Number of stored waiting-list entries.
    pub fn entry_count(&self) -> usize {
        self.tables.lock().entries.len()
    }
}

impl Store for MemoryStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let mut tables = self.tables.lock();
        let mut tx = MemoryTx::new(&mut tables);
        match f(&mut tx) {
            Ok(value) => Ok(value),
            Err(err) => {
                let undone = tx.rollback();
                tracing::debug!(undone, error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        let mut tables = self.tables.lock();
        let tx = MemoryTx::new(&mut tables);
        f(&tx)
    }
}
