//! The orchestrator facade: wires registry, probe, admission, scheduler,
//! and reporter into one submit/poll surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::core::admission::AdmissionController;
use crate::core::error::OrchestratorError;
use crate::core::executor::{RunExecutor, RunRequest};
use crate::core::probe::{spawn_probe_loop, ResourceProbe, SnapshotCell};
use crate::core::registry::{RunId, RunRegistry};
use crate::core::reporter::{DashboardSnapshot, StatusReport, StatusReporter};
use crate::core::retry::RetryPolicy;
use crate::core::scheduler::{QueuedRun, Scheduler, Spawn};
use crate::runtime::TokioSpawner;

/// Coordinates the full lifecycle of eligibility-check runs.
///
/// Submission is always non-blocking: a record is created, the run is put on
/// the pending queue, and the fresh `run_id` is returned immediately.
/// Everything after that happens on the worker pool. State lives only in
/// memory; a process restart loses all history by design.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<RunRegistry>,
    admission: Arc<AdmissionController>,
    scheduler: Scheduler,
    reporter: StatusReporter,
    shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Start an orchestrator on the given spawner.
    ///
    /// Spawns the resource probe loop and `max_concurrent_runs` workers.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConfig`] if the config fails
    /// validation or the host resource counters cannot be read.
    pub fn start<S>(
        config: OrchestratorConfig,
        executor: Arc<dyn RunExecutor>,
        spawner: S,
    ) -> Result<Self, OrchestratorError>
    where
        S: Spawn + Clone + Send + Sync + 'static,
    {
        let probe = ResourceProbe::new()
            .map_err(|e| OrchestratorError::InvalidConfig(format!("resource probe: {e}")))?;
        Self::build(config, executor, spawner, SnapshotCell::new(), Some(probe))
    }

    /// Start with an externally fed snapshot cell and no probe loop.
    ///
    /// For embedders (and tests) that sample host resources themselves and
    /// publish into `snapshots`. An empty cell means counter-only admission.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConfig`] if the config fails
    /// validation.
    pub fn start_with_snapshots<S>(
        config: OrchestratorConfig,
        executor: Arc<dyn RunExecutor>,
        spawner: S,
        snapshots: SnapshotCell,
    ) -> Result<Self, OrchestratorError>
    where
        S: Spawn + Clone + Send + Sync + 'static,
    {
        Self::build(config, executor, spawner, snapshots, None)
    }

    fn build<S>(
        config: OrchestratorConfig,
        executor: Arc<dyn RunExecutor>,
        spawner: S,
        snapshots: SnapshotCell,
        probe: Option<ResourceProbe>,
    ) -> Result<Self, OrchestratorError>
    where
        S: Spawn + Clone + Send + Sync + 'static,
    {
        config.validate()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        if let Some(probe) = probe {
            spawn_probe_loop(
                probe,
                snapshots.clone(),
                config.probe_interval,
                Arc::clone(&shutdown),
                &spawner,
            );
        }

        let registry = Arc::new(RunRegistry::new());
        let admission = Arc::new(AdmissionController::new(&config, snapshots.clone()));
        let retry = RetryPolicy::new(config.max_attempts, config.retry_backoff.clone());
        let scheduler = Scheduler::start(
            &config,
            Arc::clone(&registry),
            Arc::clone(&admission),
            retry,
            executor,
            spawner,
        );
        let reporter = StatusReporter::new(
            Arc::clone(&registry),
            snapshots,
            config.max_concurrent_runs,
        );

        tracing::info!(
            max_concurrent_runs = config.max_concurrent_runs,
            max_attempts = config.max_attempts,
            "orchestrator started"
        );

        Ok(Self {
            config,
            registry,
            admission,
            scheduler,
            reporter,
            shutdown,
        })
    }

    /// Start on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, as
    /// [`tokio::runtime::Handle::current`] does.
    pub fn with_tokio(
        config: OrchestratorConfig,
        executor: Arc<dyn RunExecutor>,
    ) -> Result<Self, OrchestratorError> {
        Self::start(config, executor, TokioSpawner::current())
    }

    /// Submit a run: create its record and enqueue it.
    ///
    /// Returns the minted `run_id` immediately regardless of queue depth or
    /// resource pressure; admission happens when a worker picks the run up.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Shutdown`] after [`shutdown`](Self::shutdown).
    pub fn submit(&self, request: RunRequest) -> Result<RunId, OrchestratorError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(OrchestratorError::Shutdown);
        }
        let run_id = self.registry.create();
        tracing::info!(run_id = %run_id, subject_id = %request.subject_id, "run submitted");
        self.scheduler.enqueue(QueuedRun {
            run_id,
            request: Arc::new(request),
        })?;
        Ok(run_id)
    }

    /// Current status of one run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for unknown ids.
    pub fn status(&self, run_id: RunId) -> Result<StatusReport, OrchestratorError> {
        self.reporter.report(run_id)
    }

    /// Aggregate state for the dashboard feed.
    #[must_use]
    pub fn dashboard(&self) -> DashboardSnapshot {
        self.reporter.dashboard(self.admission.running())
    }

    /// The configuration this orchestrator runs with.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Direct read access to the registry, for diagnostics and tests.
    #[must_use]
    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Stop accepting submissions and wind the worker pool down.
    ///
    /// In-flight runs finish; queued runs are left in their current state.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.shutdown();
        tracing::info!("orchestrator shut down");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
