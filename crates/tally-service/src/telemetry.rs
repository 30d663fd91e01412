//! Structured logging setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level is used as the
//! filter (e.g. `"info"` or `"tally_db=debug,info"`).

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Returns `false` if one was already
/// installed (tests, or a host application that set up its own).
pub fn init(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
