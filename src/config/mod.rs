//! Configuration models for the orchestrator.

/// Orchestrator tunables, validation, and environment loading.
pub mod orchestrator;

pub use orchestrator::{
    default_max_concurrent_runs, OrchestratorConfig, ENV_LOGIN_URL, ENV_MAX_ATTEMPTS,
    ENV_MAX_CONCURRENT_RUNS, ENV_RUN_TIMEOUT_SECS,
};
