//! Time source abstraction.
//!
//! Offer deadlines, availability reads and rate-limit windows all read the
//! injected [`Clock`], so tests can move time without sleeping.

use chrono::{DateTime, Utc};

/// Abstracts "now" for testability.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-helpers"))]
mod manual {
    use std::sync::atomic::{AtomicI64, Ordering};

    use chrono::{DateTime, Duration, Utc};

    use super::Clock;

    /// A clock that only moves when told to. **Tests only.**
    #[derive(Debug)]
    pub struct ManualClock {
        base: DateTime<Utc>,
        offset_ms: AtomicI64,
    }

    impl ManualClock {
        #[must_use]
        pub fn starting_at(base: DateTime<Utc>) -> Self {
            Self {
                base,
                offset_ms: AtomicI64::new(0),
            }
        }

        /// Move time forward by `by`.
        pub fn advance(&self, by: Duration) {
            self.offset_ms.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        }

        /// Jump to an absolute instant (may move backwards).
        pub fn set(&self, at: DateTime<Utc>) {
            self.offset_ms
                .store((at - self.base).num_milliseconds(), Ordering::SeqCst);
        }
    }

    impl Default for ManualClock {
        /// 2025-01-01T00:00:00Z.
        fn default() -> Self {
            Self::starting_at(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + Duration::milliseconds(self.offset_ms.load(Ordering::SeqCst))
        }
    }
}
