//! Join throttling.
//!
//! The Join Gate consults a [`RateLimiter`] before touching the store. A
//! refusal is a retryable condition carrying the wait time, never a fatal
//! error.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use waitlist_types::{RateLimitPolicy, UserId};

/// Result of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Per-key quota check. Every call counts as an attempt.
pub trait RateLimiter: Send + Sync {
    fn try_acquire(&self, key: &UserId, now: DateTime<Utc>) -> RateDecision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Fixed-window counter: at most `max_requests` acquisitions per key per
/// window. A key's window opens at its first acquisition and resets once
/// `window_ms` has elapsed.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<UserId, Window>>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn window_len(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.policy.window_ms).unwrap_or(i64::MAX))
    }

    /// Drop windows that ended before `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let len = self.window_len();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| w.started_at + len > now);
        before - windows.len()
    }

    /// Number of keys with an open window.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn try_acquire(&self, key: &UserId, now: DateTime<Utc>) -> RateDecision {
        let len = self.window_len();
        let mut windows = self.windows.lock();
        let window = windows.entry(*key).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if window.started_at + len <= now {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.policy.max_requests {
            let retry_after = (window.started_at + len - now).to_std().unwrap_or_default();
            return RateDecision::Limited { retry_after };
        }

        window.count += 1;
        RateDecision::Allowed
    }
}

/// Never refuses. For hosts that throttle upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn try_acquire(&self, _key: &UserId, _now: DateTime<Utc>) -> RateDecision {
        RateDecision::Allowed
    }
}
