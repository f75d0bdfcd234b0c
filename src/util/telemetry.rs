//! Tracing initialization for the orchestrator.

use tracing_subscriber::EnvFilter;

/// Install a default env-filtered subscriber if none is set.
///
/// Embedders with their own subscriber can skip this entirely; the
/// orchestrator only emits `tracing` events and never requires a particular
/// subscriber. With `RUST_LOG` unset, orchestrator events log at `info`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("run_orchestrator=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
