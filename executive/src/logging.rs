//! Diagnostic tracing for the agent binary.
//!
//! The library only emits `tracing` events (directly or through
//! [`crate::observer::TracingObserver`]); installing a subscriber is left to
//! the binary so embedders keep control of their own output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`; `verbose` raises the default to
/// `info`. Output is compact and goes to stderr so stdout stays reserved for
/// the run report.
///
/// # Example
/// ```bash
/// RUST_LOG=executive=debug executive run "Compute 2+2"
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
