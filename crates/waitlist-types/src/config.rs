//! Engine configuration.
//!
//! Every field has a default from [`crate::constants`], so an empty JSON
//! object is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{WaitlistError, constants};

/// Fixed-window quota: at most `max_requests` per `window_ms` per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitPolicy {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: constants::JOIN_RATE_LIMIT_COUNT,
            window_ms: constants::JOIN_RATE_LIMIT_WINDOW_MS,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info,waitlist_engine=debug"`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: constants::DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

/// Configuration for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of a purchase offer.
    pub offer_window_ms: u64,
    /// Quota applied by the join gate.
    pub join_rate_limit: RateLimitPolicy,
    /// Period of the overdue-offer sweep.
    pub cleanup_interval_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            offer_window_ms: constants::DEFAULT_OFFER_WINDOW_MS,
            join_rate_limit: RateLimitPolicy::default(),
            cleanup_interval_ms: constants::DEFAULT_CLEANUP_INTERVAL_MS,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// Returns [`WaitlistError::Configuration`] for malformed JSON or
    /// values rejected by [`EngineConfig::validate`].
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| WaitlistError::Configuration(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would disable offers or the join quota,
    /// or push offer deadlines past what date arithmetic can represent.
    ///
    /// # Errors
    /// Returns [`WaitlistError::Configuration`] naming the offending field.
    pub fn validate(&self) -> crate::Result<()> {
        if self.offer_window_ms == 0 {
            return Err(WaitlistError::Configuration(
                "offer_window_ms must be > 0".into(),
            ));
        }
        if self.offer_window_ms > constants::MAX_OFFER_WINDOW_MS {
            return Err(WaitlistError::Configuration(format!(
                "offer_window_ms must be <= {}",
                constants::MAX_OFFER_WINDOW_MS
            )));
        }
        if self.join_rate_limit.max_requests == 0 {
            return Err(WaitlistError::Configuration(
                "join_rate_limit.max_requests must be > 0".into(),
            ));
        }
        if self.join_rate_limit.window_ms == 0 {
            return Err(WaitlistError::Configuration(
                "join_rate_limit.window_ms must be > 0".into(),
            ));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(WaitlistError::Configuration(
                "cleanup_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn offer_window(&self) -> Duration {
        Duration::from_millis(self.offer_window_ms)
    }

    /// Offer window as a chrono duration, for deadline arithmetic.
    #[must_use]
    pub fn offer_window_chrono(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.offer_window_ms).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}
