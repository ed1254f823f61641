//! Logging setup shared by the daemon binary and its internal-helper
//! re-exec modes.
//!
//! Grounded on the teacher's `init_logging_for` (`boxlite::init_logging_for`):
//! a `tracing-subscriber` `fmt` layer with an `EnvFilter` driven by
//! `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber for the daemon process.
///
/// Idempotent-ish: if a subscriber is already installed (e.g. in tests that
/// call this more than once) the error is swallowed, matching the common
/// `let _ = ...` pattern used for this exact situation in the teacher crate.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Critical-path log lines keep the legacy `[CM CRITICAL ERROR]` /
/// `[CM CRITICAL INFO]` prefixes from the original daemon so that existing
/// log scraping on the device keeps working unchanged.
pub fn critical_error(message: impl std::fmt::Display) {
    tracing::error!("[CM CRITICAL ERROR] {}", message);
}

pub fn critical_info(message: impl std::fmt::Display) {
    tracing::info!("[CM CRITICAL INFO] {}", message);
}
