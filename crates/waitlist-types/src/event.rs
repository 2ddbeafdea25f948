//! Ticketed events.
//!
//! Event metadata is owned by the seller. The engine reads capacity and the
//! cancellation flag, and writes the flag when an event is cancelled.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EventId, UserId, WaitlistError};

/// A ticketed event with fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// The seller who owns this event.
    pub seller_id: UserId,
    pub name: String,
    pub description: String,
    pub location: String,
    pub event_date: DateTime<Utc>,
    pub price: Decimal,
    /// Capacity. Never lowered below sold tickets plus live offers.
    pub total_tickets: u32,
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Case-insensitive substring match on name, description or location.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        [&self.name, &self.description, &self.location]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

/// Fields supplied by a seller when creating an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub seller_id: UserId,
    pub name: String,
    pub description: String,
    pub location: String,
    pub event_date: DateTime<Utc>,
    pub price: Decimal,
    pub total_tickets: u32,
}

impl NewEvent {
    /// Build the stored record.
    ///
    /// # Errors
    /// Returns [`WaitlistError::InvalidCapacity`] for zero capacity.
    pub fn into_event(self, created_at: DateTime<Utc>) -> crate::Result<Event> {
        if self.total_tickets == 0 {
            return Err(WaitlistError::InvalidCapacity(self.total_tickets));
        }
        Ok(Event {
            id: EventId::new(),
            seller_id: self.seller_id,
            name: self.name,
            description: self.description,
            location: self.location,
            event_date: self.event_date,
            price: self.price,
            total_tickets: self.total_tickets,
            is_cancelled: false,
            created_at,
        })
    }
}

/// A partial update of seller-editable fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub price: Option<Decimal>,
    pub total_tickets: Option<u32>,
}

impl EventUpdate {
    /// Apply the update, refusing a capacity below the `sold` tickets plus
    /// the `offered` slots still reserved by live offers.
    ///
    /// # Errors
    /// - [`WaitlistError::InvalidCapacity`] for zero capacity
    /// - [`WaitlistError::CapacityBelowSold`] if capacity < `sold`
    /// - [`WaitlistError::CapacityBelowReserved`] if capacity < `sold + offered`
    pub fn apply(self, event: &mut Event, sold: u32, offered: u32) -> crate::Result<()> {
        if let Some(total) = self.total_tickets {
            if total == 0 {
                return Err(WaitlistError::InvalidCapacity(total));
            }
            if total < sold {
                return Err(WaitlistError::CapacityBelowSold {
                    requested: total,
                    sold,
                });
            }
            if total < sold.saturating_add(offered) {
                return Err(WaitlistError::CapacityBelowReserved {
                    requested: total,
                    sold,
                    offered,
                });
            }
            event.total_tickets = total;
        }
        if let Some(name) = self.name {
            event.name = name;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(date) = self.event_date {
            event.event_date = date;
        }
        if let Some(price) = self.price {
            event.price = price;
        }
        Ok(())
    }
}

/// Dummy event for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl NewEvent {
    pub fn dummy(total_tickets: u32) -> Self {
        Self {
            seller_id: UserId::new(),
            name: "Test Concert".to_string(),
            description: "An event for tests".to_string(),
            location: "Main Hall".to_string(),
            event_date: Utc::now() + chrono::Duration::days(30),
            price: Decimal::new(2500, 2),
            total_tickets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_rejected() {
        let err = NewEvent::dummy(0).into_event(Utc::now()).unwrap_err();
        assert!(matches!(err, WaitlistError::InvalidCapacity(0)));
    }

    #[test]
    fn new_event_starts_active() {
        let event = NewEvent::dummy(10).into_event(Utc::now()).unwrap();
        assert!(!event.is_cancelled);
        assert_eq!(event.total_tickets, 10);
    }

    #[test]
    fn search_ignores_case_across_text_fields() {
        let event = NewEvent::dummy(1).into_event(Utc::now()).unwrap();
        assert!(event.matches("concert"));
        assert!(event.matches("FOR TESTS"));
        assert!(event.matches("main hall"));
        assert!(event.matches(""));
        assert!(!event.matches("opera"));
    }

    #[test]
    fn capacity_cannot_drop_below_sold() {
        let mut event = NewEvent::dummy(10).into_event(Utc::now()).unwrap();
        let update = EventUpdate {
            total_tickets: Some(3),
            name: Some("Renamed".into()),
            ..EventUpdate::default()
        };
        let err = update.apply(&mut event, 4, 0).unwrap_err();
        assert!(matches!(
            err,
            WaitlistError::CapacityBelowSold {
                requested: 3,
                sold: 4
            }
        ));
        // Nothing applied on failure
        assert_eq!(event.total_tickets, 10);
        assert_eq!(event.name, "Test Concert");
    }

    #[test]
    fn capacity_equal_to_sold_allowed() {
        let mut event = NewEvent::dummy(10).into_event(Utc::now()).unwrap();
        let update = EventUpdate {
            total_tickets: Some(4),
            price: Some(Decimal::new(3000, 2)),
            ..EventUpdate::default()
        };
        update.apply(&mut event, 4, 0).unwrap();
        assert_eq!(event.total_tickets, 4);
        assert_eq!(event.price, Decimal::new(3000, 2));
    }

    #[test]
    fn capacity_cannot_drop_below_live_offers() {
        let mut event = NewEvent::dummy(5).into_event(Utc::now()).unwrap();
        let cut = EventUpdate {
            total_tickets: Some(3),
            ..EventUpdate::default()
        };
        let err = cut.clone().apply(&mut event, 1, 3).unwrap_err();
        assert!(matches!(
            err,
            WaitlistError::CapacityBelowReserved {
                requested: 3,
                sold: 1,
                offered: 3
            }
        ));
        assert_eq!(event.total_tickets, 5);

        cut.apply(&mut event, 1, 2).unwrap();
        assert_eq!(event.total_tickets, 3);
    }
}
