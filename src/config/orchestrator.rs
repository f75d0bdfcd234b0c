//! Orchestrator configuration with validation and environment loading.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::OrchestratorError;
use crate::core::retry::BackoffPolicy;

/// Environment variable for the portal login URL.
pub const ENV_LOGIN_URL: &str = "LOGIN_URL";
/// Environment variable capping concurrent runs.
pub const ENV_MAX_CONCURRENT_RUNS: &str = "MAX_CONCURRENT_RUNS";
/// Environment variable for the total attempt budget per run.
pub const ENV_MAX_ATTEMPTS: &str = "MAX_ATTEMPTS";
/// Environment variable for the per-run hard timeout in seconds.
pub const ENV_RUN_TIMEOUT_SECS: &str = "RUN_TIMEOUT_SECS";

const DEFAULT_LOGIN_URL: &str = "https://veiculos.bancopan.com.br/login";

/// Tunables for the run orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Base URL of the portal login page, handed to every executor call.
    pub login_url: String,
    /// Upper bound on concurrently running executors.
    pub max_concurrent_runs: u32,
    /// Total attempts allowed per run, including the first.
    pub max_attempts: u32,
    /// Backoff curve between retry attempts.
    pub retry_backoff: BackoffPolicy,
    /// CPU headroom one run is assumed to need, as a host fraction.
    pub per_run_cpu_budget: f64,
    /// Memory headroom one run is assumed to need, as a host fraction.
    pub per_run_memory_budget: f64,
    /// Hard ceiling on one executor invocation; exceeding it force-fails
    /// the run. Keep well above the expected p99 executor latency.
    pub run_timeout: Duration,
    /// Resource probe sampling interval.
    pub probe_interval: Duration,
    /// Age past which a snapshot no longer gates admission.
    pub snapshot_staleness: Duration,
    /// How long a worker sleeps before re-asking admission for a deferred run.
    pub admission_retry_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            max_concurrent_runs: default_max_concurrent_runs(),
            max_attempts: 3,
            retry_backoff: BackoffPolicy::default(),
            per_run_cpu_budget: 0.15,
            per_run_memory_budget: 0.10,
            run_timeout: Duration::from_secs(180),
            probe_interval: Duration::from_secs(5),
            snapshot_staleness: Duration::from_secs(15),
            admission_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Host core count minus one, leaving headroom for the orchestrating
/// process itself. Never below 1.
#[must_use]
pub fn default_max_concurrent_runs() -> u32 {
    let cores = u32::try_from(num_cpus::get()).unwrap_or(1);
    cores.saturating_sub(1).max(1)
}

impl OrchestratorConfig {
    /// Load configuration from the environment, applying defaults for unset
    /// variables. Reads a `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConfig`] for unparseable values or
    /// values that fail [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, OrchestratorError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_LOGIN_URL) {
            config.login_url = url;
        }
        if let Some(value) = parse_env(ENV_MAX_CONCURRENT_RUNS)? {
            config.max_concurrent_runs = value;
        }
        if let Some(value) = parse_env(ENV_MAX_ATTEMPTS)? {
            config.max_attempts = value;
        }
        if let Some(secs) = parse_env::<u64>(ENV_RUN_TIMEOUT_SECS)? {
            config.run_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConfig`] naming the offending
    /// field.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.login_url.trim().is_empty() {
            return Err(invalid("login_url must not be empty"));
        }
        if self.max_concurrent_runs == 0 {
            return Err(invalid("max_concurrent_runs must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.per_run_cpu_budget) {
            return Err(invalid("per_run_cpu_budget must be within [0.0, 1.0]"));
        }
        if !(0.0..=1.0).contains(&self.per_run_memory_budget) {
            return Err(invalid("per_run_memory_budget must be within [0.0, 1.0]"));
        }
        if self.run_timeout.is_zero() {
            return Err(invalid("run_timeout must be greater than zero"));
        }
        if self.probe_interval.is_zero() {
            return Err(invalid("probe_interval must be greater than zero"));
        }
        if self.retry_backoff.multiplier < 1.0 {
            return Err(invalid("retry_backoff.multiplier must be at least 1.0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> OrchestratorError {
    OrchestratorError::InvalidConfig(message.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, OrchestratorError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| OrchestratorError::InvalidConfig(format!("{name}={raw} is not valid"))),
        Err(_) => Ok(None),
    }
}
