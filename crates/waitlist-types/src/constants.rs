//! System-wide constants for the waiting-list engine.

/// How long an offered user has to complete a purchase (15 minutes).
pub const DEFAULT_OFFER_WINDOW_MS: u64 = 15 * 60 * 1000;

/// Longest offer window a configuration may ask for (1 day).
pub const MAX_OFFER_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// Maximum waiting-list joins per user within one rate-limit window.
pub const JOIN_RATE_LIMIT_COUNT: u32 = 3;

/// Length of the fixed join rate-limit window (30 minutes).
pub const JOIN_RATE_LIMIT_WINDOW_MS: u64 = 30 * 60 * 1000;

/// Period of the safety-net sweep that flips overdue offers.
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60 * 1000;

/// Default `tracing` filter directive.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Waitlist";
