//! Diagnostic tracing for `refresher` runs.
//!
//! Everything emitted here goes to stderr and is filtered by `RUST_LOG`.
//! The audit entries under `agent-reasoning/` are written by
//! [`crate::io::run_log`] regardless of the filter, so turning tracing off
//! never loses a run record.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset or unparsable. Fallback warnings
/// and log-write failures still surface at this level.
const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the global subscriber. Call once, first thing in `main`.
///
/// `RUST_LOG=refresher=debug` shows prompt budgeting and backend timing.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
