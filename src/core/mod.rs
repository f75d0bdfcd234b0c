//! Core orchestration: registry, admission, scheduling, retry, reporting.

/// Admission control over concurrency slots and resource headroom.
pub mod admission;
/// Error taxonomy for orchestrator and executor failures.
pub mod error;
/// The opaque executor contract and run request/outcome types.
pub mod executor;
/// The orchestrator facade wiring all components together.
pub mod orchestrator;
/// Host CPU/memory sampling and the snapshot handoff cell.
pub mod probe;
/// The in-memory run-state registry.
pub mod registry;
/// Read-only status and dashboard projections.
pub mod reporter;
/// Retry policy and backoff curve.
pub mod retry;
/// The FIFO worker pool driving executor invocations.
pub mod scheduler;

pub use admission::{AdmissionController, AdmissionDecision, DeferReason};
pub use error::{AppResult, ErrorKind, ExecError, OrchestratorError};
pub use executor::{RunExecutor, RunOutcome, RunRequest};
pub use orchestrator::Orchestrator;
pub use probe::{ResourceProbe, ResourceSnapshot, SnapshotCell};
pub use registry::{RunId, RunRecord, RunRegistry, RunStatus};
pub use reporter::{DashboardSnapshot, RunElapsed, StatusReport, StatusReporter};
pub use retry::{BackoffPolicy, RetryDecision, RetryPolicy};
pub use scheduler::{QueuedRun, Scheduler, Spawn};
