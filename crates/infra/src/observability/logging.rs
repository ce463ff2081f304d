//! `tracing` subscriber initialisation
//!
//! `RUST_LOG`, when set, takes precedence over the configured level so a
//! single run can be made more verbose without editing config.

use partsource_domain::{LoggingConfig, PartSourceError, Result};
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber: pretty output for terminals, JSON lines
/// when `config.json` is set
///
/// # Errors
/// Returns `PartSourceError::Config` for an unparseable level directive or
/// when a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            PartSourceError::Config(format!("invalid log level '{}': {e}", config.level))
        })?,
    };

    let builder = fmt().with_env_filter(filter).with_target(true).with_line_number(true);
    let installed = if config.json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| PartSourceError::Config(format!("tracing already initialised: {e}")))
}

/// Debug-level output captured by the test harness; repeated calls are no-ops
pub fn init_test_tracing() {
    let _ = fmt().with_env_filter(EnvFilter::new("debug")).with_test_writer().try_init();
}
