//! Log subscriber setup.

use tracing_subscriber::EnvFilter;
use waitlist_types::{LoggingConfig, Result, WaitlistError};

/// Install the global `tracing` subscriber described by `config`.
///
/// # Errors
/// Returns [`WaitlistError::Configuration`] for an unparsable filter or
/// when a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        WaitlistError::Configuration(format!("invalid log filter {:?}: {e}", config.filter))
    })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| WaitlistError::Configuration(format!("tracing already initialised: {e}")))
}
