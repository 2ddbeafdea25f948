//! Identifiers for events, users, tickets, and waiting-list entries.
//!
//! All record IDs are UUIDv7, so they sort by creation time. Waiting-list
//! entries rely on this to break FIFO ties between entries created in the
//! same millisecond.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Fresh time-ordered id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Id from a known UUID, e.g. one handed over by another system.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str($prefix)?;
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a ticketed event.
    EventId,
    "evt:"
);

uuid_id!(
    /// Identity of a buyer or seller, issued by the external identity
    /// provider and passed through unchanged.
    UserId,
    ""
);

uuid_id!(
    /// Identifier of a sold ticket.
    TicketId,
    "tkt:"
);

uuid_id!(
    /// Identifier of a waiting-list entry. Second half of the FIFO key.
    EntryId,
    "wl:"
);
