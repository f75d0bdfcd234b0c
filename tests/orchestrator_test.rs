//! Integration tests for the run orchestrator.
//!
//! Covers the end-to-end properties: the concurrency cap, FIFO hand-off
//! between queued runs, retry semantics for transient vs terminal failures,
//! the hard timeout, worker panic isolation, admission under resource
//! pressure, and the submit/poll API surface.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use run_orchestrator::config::OrchestratorConfig;
use run_orchestrator::core::{
    BackoffPolicy, ErrorKind, ExecError, Orchestrator, ResourceSnapshot, RunExecutor, RunId,
    RunOutcome, RunRequest, RunStatus, SnapshotCell,
};
use run_orchestrator::runtime::{run_status, submit_run, RunSubmission, TokioSpawner};
use run_orchestrator::util::now_ms;

// ============================================================================
// HELPERS
// ============================================================================

/// Config tuned for fast tests: tight backoff and admission polling, no
/// probe (tests feed the snapshot cell directly where needed).
fn test_config(max_concurrent_runs: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        max_concurrent_runs,
        max_attempts: 3,
        retry_backoff: BackoffPolicy {
            initial: Duration::from_millis(50),
            multiplier: 1.0,
            max: Duration::from_millis(50),
        },
        admission_retry_delay: Duration::from_millis(10),
        run_timeout: Duration::from_secs(10),
        ..OrchestratorConfig::default()
    }
}

fn start(config: OrchestratorConfig, executor: Arc<dyn RunExecutor>) -> Orchestrator {
    Orchestrator::start_with_snapshots(config, executor, TokioSpawner::current(), SnapshotCell::new())
        .unwrap()
}

fn submission(subject: &str) -> RunSubmission {
    RunSubmission {
        login: "user".into(),
        password: "secret".into(),
        subject_id: subject.into(),
    }
}

/// Poll until the run reaches `wanted` or the timeout expires.
async fn wait_for_status(orchestrator: &Orchestrator, run_id: RunId, wanted: RunStatus) {
    wait_until(
        || orchestrator.status(run_id).unwrap().status == wanted,
        &format!("run {run_id} did not reach {wanted:?}"),
    )
    .await;
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// TEST EXECUTORS
// ============================================================================

/// Blocks each invocation until the test hands out a permit.
#[derive(Clone)]
struct GatedExecutor {
    gate: Arc<Semaphore>,
}

impl GatedExecutor {
    fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    fn release_one(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl RunExecutor for GatedExecutor {
    async fn execute(&self, request: RunRequest) -> Result<RunOutcome, ExecError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ExecError::internal("gate closed"))?;
        permit.forget();
        Ok(RunOutcome {
            result: format!("done: {}", request.subject_id),
            log_summary: "gated run released".into(),
        })
    }
}

/// Pops a scripted outcome per invocation, counting calls.
struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<Result<RunOutcome, ExecError>>>,
    calls: AtomicU32,
}

impl ScriptedExecutor {
    fn new(outcomes: Vec<Result<RunOutcome, ExecError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn ok(result: &str) -> Result<RunOutcome, ExecError> {
        Ok(RunOutcome {
            result: result.into(),
            log_summary: format!("scripted: {result}"),
        })
    }
}

#[async_trait]
impl RunExecutor for ScriptedExecutor {
    async fn execute(&self, _request: RunRequest) -> Result<RunOutcome, ExecError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExecError::internal("script exhausted")))
    }
}

/// Tracks the high-water mark of concurrent invocations.
struct ConcurrencyGaugeExecutor {
    current: AtomicU32,
    max_seen: AtomicU32,
}

impl ConcurrencyGaugeExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicU32::new(0),
            max_seen: AtomicU32::new(0),
        })
    }

    fn max_seen(&self) -> u32 {
        self.max_seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RunExecutor for ConcurrencyGaugeExecutor {
    async fn execute(&self, request: RunRequest) -> Result<RunOutcome, ExecError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(RunOutcome {
            result: format!("ok: {}", request.subject_id),
            log_summary: "gauge run".into(),
        })
    }
}

/// Never returns within any reasonable test horizon.
struct StuckExecutor;

#[async_trait]
impl RunExecutor for StuckExecutor {
    async fn execute(&self, _request: RunRequest) -> Result<RunOutcome, ExecError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(RunOutcome {
            result: "unreachable".into(),
            log_summary: String::new(),
        })
    }
}

/// Panics on every invocation.
struct PanickingExecutor;

#[async_trait]
impl RunExecutor for PanickingExecutor {
    async fn execute(&self, _request: RunRequest) -> Result<RunOutcome, ExecError> {
        panic!("browser session exploded");
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// Scenario A: with one slot, Y queues behind X and starts by itself once X
/// completes.
#[tokio::test]
async fn second_run_waits_for_first_slot() {
    let executor = GatedExecutor::new();
    let orchestrator = start(test_config(1), Arc::new(executor.clone()));

    let x = submit_run(&orchestrator, &submission("x")).unwrap().run_id;
    wait_for_status(&orchestrator, x, RunStatus::Running).await;

    let y = submit_run(&orchestrator, &submission("y")).unwrap().run_id;
    // Y must hold in Queued while X occupies the only slot.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orchestrator.status(y).unwrap().status, RunStatus::Queued);

    executor.release_one();
    wait_for_status(&orchestrator, x, RunStatus::Completed).await;
    // Y starts without any external intervention.
    wait_for_status(&orchestrator, y, RunStatus::Running).await;
    executor.release_one();
    wait_for_status(&orchestrator, y, RunStatus::Completed).await;
}

/// Scenario B: a terminal failure on the first attempt never retries.
#[tokio::test]
async fn invalid_credentials_fail_without_retry() {
    let executor = ScriptedExecutor::new(vec![Err(ExecError::invalid_input(
        "invalid credentials",
    ))]);
    let orchestrator = start(test_config(1), executor.clone());

    let id = submit_run(&orchestrator, &submission("s")).unwrap().run_id;
    wait_for_status(&orchestrator, id, RunStatus::Failed).await;

    let record = orchestrator.registry().get(id).unwrap();
    assert_eq!(record.attempt, 1);
    assert_eq!(record.last_error, Some(ErrorKind::InvalidInput));
    assert_eq!(record.log_summary.as_deref(), Some("invalid credentials"));
    // Give any wrongly scheduled retry a chance to fire, then recheck.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(executor.calls(), 1);
    assert_eq!(orchestrator.status(id).unwrap().status, RunStatus::Failed);
}

/// Scenario C: two transient failures, then success, with max_attempts = 3.
#[tokio::test]
async fn transient_failures_retry_until_success() {
    let executor = ScriptedExecutor::new(vec![
        Err(ExecError::transient("connection reset")),
        Err(ExecError::transient("site flapped")),
        ScriptedExecutor::ok("eligible"),
    ]);
    let orchestrator = start(test_config(1), executor.clone());

    let id = submit_run(&orchestrator, &submission("s")).unwrap().run_id;
    wait_for_status(&orchestrator, id, RunStatus::Completed).await;

    let record = orchestrator.registry().get(id).unwrap();
    assert_eq!(record.attempt, 3);
    assert_eq!(record.result.as_deref(), Some("eligible"));
    assert_eq!(executor.calls(), 3);
}

/// Exhausting the attempt budget converts the last transient error into a
/// terminal failure.
#[tokio::test]
async fn exhausted_retries_end_failed() {
    let executor = ScriptedExecutor::new(vec![
        Err(ExecError::transient("down")),
        Err(ExecError::transient("down")),
        Err(ExecError::transient("still down")),
    ]);
    let orchestrator = start(test_config(1), executor.clone());

    let id = submit_run(&orchestrator, &submission("s")).unwrap().run_id;
    wait_for_status(&orchestrator, id, RunStatus::Failed).await;

    let record = orchestrator.registry().get(id).unwrap();
    assert_eq!(record.attempt, 3);
    assert_eq!(record.last_error, Some(ErrorKind::Transient));
    // No silent re-queue after exhaustion.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(executor.calls(), 3);
    assert_eq!(orchestrator.status(id).unwrap().status, RunStatus::Failed);
}

/// The Retrying status is visible to pollers during the backoff window.
#[tokio::test]
async fn retrying_status_is_observable() {
    let config = OrchestratorConfig {
        retry_backoff: BackoffPolicy {
            initial: Duration::from_millis(500),
            multiplier: 1.0,
            max: Duration::from_millis(500),
        },
        ..test_config(1)
    };
    let executor = ScriptedExecutor::new(vec![
        Err(ExecError::site_error("broken page")),
        ScriptedExecutor::ok("eligible"),
    ]);
    let orchestrator = start(config, executor);

    let id = submit_run(&orchestrator, &submission("s")).unwrap().run_id;
    wait_for_status(&orchestrator, id, RunStatus::Retrying).await;
    wait_for_status(&orchestrator, id, RunStatus::Completed).await;
}

/// Scenario D: resource pressure defers admission even with free slots;
/// recovery resumes it.
#[tokio::test]
async fn resource_pressure_defers_admission() {
    let snapshots = SnapshotCell::new();
    snapshots.publish(ResourceSnapshot {
        cpu_fraction: 0.95,
        memory_fraction: 0.5,
        sampled_at_ms: now_ms(),
    });
    let executor = ScriptedExecutor::new(vec![ScriptedExecutor::ok("eligible")]);
    let orchestrator = Orchestrator::start_with_snapshots(
        test_config(2),
        executor,
        TokioSpawner::current(),
        snapshots.clone(),
    )
    .unwrap();

    let id = submit_run(&orchestrator, &submission("s")).unwrap().run_id;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(orchestrator.status(id).unwrap().status, RunStatus::Queued);

    // Pressure clears; the run proceeds without new submissions.
    snapshots.publish(ResourceSnapshot {
        cpu_fraction: 0.2,
        memory_fraction: 0.3,
        sampled_at_ms: now_ms(),
    });
    wait_for_status(&orchestrator, id, RunStatus::Completed).await;
}

/// A stale over-budget snapshot no longer gates admission.
#[tokio::test]
async fn stale_snapshot_degrades_to_counter_only() {
    let snapshots = SnapshotCell::new();
    snapshots.publish(ResourceSnapshot {
        cpu_fraction: 0.99,
        memory_fraction: 0.99,
        sampled_at_ms: now_ms().saturating_sub(120_000),
    });
    let executor = ScriptedExecutor::new(vec![ScriptedExecutor::ok("eligible")]);
    let orchestrator = Orchestrator::start_with_snapshots(
        test_config(1),
        executor,
        TokioSpawner::current(),
        snapshots,
    )
    .unwrap();

    let id = submit_run(&orchestrator, &submission("s")).unwrap().run_id;
    wait_for_status(&orchestrator, id, RunStatus::Completed).await;
}

// ============================================================================
// INVARIANTS
// ============================================================================

/// Running count never exceeds max_concurrent_runs, for any burst.
#[tokio::test]
async fn concurrency_cap_holds_under_burst() {
    let executor = ConcurrencyGaugeExecutor::new();
    let orchestrator = start(test_config(2), executor.clone());

    let ids: Vec<RunId> = (0..10)
        .map(|i| {
            submit_run(&orchestrator, &submission(&format!("s{i}")))
                .unwrap()
                .run_id
        })
        .collect();
    for id in &ids {
        wait_for_status(&orchestrator, *id, RunStatus::Completed).await;
    }
    assert!(executor.max_seen() <= 2, "cap breached: {}", executor.max_seen());
    assert!(executor.max_seen() >= 1);
}

/// A run stuck past the hard timeout is force-failed and its slot reclaimed.
#[tokio::test]
async fn hard_timeout_force_fails_and_reclaims_slot() {
    let config = OrchestratorConfig {
        run_timeout: Duration::from_millis(100),
        ..test_config(1)
    };
    let orchestrator = start(config, Arc::new(StuckExecutor));

    let stuck = submit_run(&orchestrator, &submission("stuck")).unwrap().run_id;
    wait_for_status(&orchestrator, stuck, RunStatus::Failed).await;
    let record = orchestrator.registry().get(stuck).unwrap();
    assert_eq!(record.last_error, Some(ErrorKind::Timeout));

    // The slot is free again: the next run reaches Running.
    let next = submit_run(&orchestrator, &submission("next")).unwrap().run_id;
    wait_for_status(&orchestrator, next, RunStatus::Running).await;
}

/// A panicking executor finalizes the record instead of leaking a Running
/// run, and the worker keeps serving.
#[tokio::test]
async fn executor_panic_is_isolated() {
    let executor = GatedExecutor::new();
    struct SplitExecutor {
        first: AtomicU32,
        gated: GatedExecutor,
    }
    #[async_trait]
    impl RunExecutor for SplitExecutor {
        async fn execute(&self, request: RunRequest) -> Result<RunOutcome, ExecError> {
            if self.first.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("browser session exploded");
            }
            self.gated.execute(request).await
        }
    }

    let orchestrator = start(
        test_config(1),
        Arc::new(SplitExecutor {
            first: AtomicU32::new(0),
            gated: executor.clone(),
        }),
    );

    let crashed = submit_run(&orchestrator, &submission("boom")).unwrap().run_id;
    wait_for_status(&orchestrator, crashed, RunStatus::Failed).await;
    let record = orchestrator.registry().get(crashed).unwrap();
    assert_eq!(record.last_error, Some(ErrorKind::Internal));

    let survivor = submit_run(&orchestrator, &submission("ok")).unwrap().run_id;
    wait_for_status(&orchestrator, survivor, RunStatus::Running).await;
    executor.release_one();
    wait_for_status(&orchestrator, survivor, RunStatus::Completed).await;
}

/// Every submission in a concurrent burst gets a unique run id.
#[tokio::test]
async fn concurrent_submissions_get_unique_ids() {
    let executor = ConcurrencyGaugeExecutor::new();
    let orchestrator = Arc::new(start(test_config(4), executor));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                submit_run(&orchestrator, &submission(&format!("s{i}")))
                    .unwrap()
                    .run_id
            })
        })
        .collect();
    let ids: Vec<RunId> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    assert_eq!(orchestrator.registry().len(), 16);
}

// ============================================================================
// API SURFACE
// ============================================================================

/// Malformed submissions never create a record.
#[tokio::test]
async fn validation_error_creates_no_record() {
    let executor = ScriptedExecutor::new(vec![]);
    let orchestrator = start(test_config(1), executor);

    let bad = RunSubmission {
        login: String::new(),
        password: "secret".into(),
        subject_id: "123".into(),
    };
    assert!(submit_run(&orchestrator, &bad).is_err());
    assert!(orchestrator.registry().is_empty());
    assert_eq!(orchestrator.dashboard().queued, 0);
}

/// Unknown run ids yield NotFound, not a panic or an empty payload.
#[tokio::test]
async fn unknown_run_id_is_not_found() {
    let executor = ScriptedExecutor::new(vec![]);
    let orchestrator = start(test_config(1), executor);
    assert!(run_status(&orchestrator, uuid::Uuid::new_v4()).is_err());
}

/// Status reads are idempotent once a run is terminal.
#[tokio::test]
async fn terminal_status_reads_are_idempotent() {
    let executor = ScriptedExecutor::new(vec![ScriptedExecutor::ok("eligible")]);
    let orchestrator = start(test_config(1), executor);

    let id = submit_run(&orchestrator, &submission("s")).unwrap().run_id;
    wait_for_status(&orchestrator, id, RunStatus::Completed).await;

    let first = run_status(&orchestrator, id).unwrap();
    let second = run_status(&orchestrator, id).unwrap();
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
    assert_eq!(first.result.as_deref(), Some("eligible"));
}

/// The dashboard aggregates counts and the published resource snapshot.
#[tokio::test]
async fn dashboard_reflects_queue_and_resources() {
    let snapshots = SnapshotCell::new();
    let executor = GatedExecutor::new();
    let orchestrator = Orchestrator::start_with_snapshots(
        test_config(1),
        Arc::new(executor.clone()),
        TokioSpawner::current(),
        snapshots.clone(),
    )
    .unwrap();

    let x = submit_run(&orchestrator, &submission("x")).unwrap().run_id;
    let _y = submit_run(&orchestrator, &submission("y")).unwrap().run_id;
    wait_for_status(&orchestrator, x, RunStatus::Running).await;

    snapshots.publish(ResourceSnapshot {
        cpu_fraction: 0.4,
        memory_fraction: 0.6,
        sampled_at_ms: now_ms(),
    });

    let dash = orchestrator.dashboard();
    assert_eq!(dash.active, 1);
    assert_eq!(dash.queued, 1);
    assert_eq!(dash.available_slots, 0);
    assert_eq!(dash.max_concurrent_runs, 1);
    let resource = dash.resource.unwrap();
    assert!((resource.cpu_fraction - 0.4).abs() < f64::EPSILON);
    assert_eq!(dash.runs.len(), 2);

    executor.release_one();
    executor.release_one();
    wait_until(
        || orchestrator.dashboard().completed == 2,
        "both runs completed",
    )
    .await;
}

/// Submissions after shutdown are refused.
#[tokio::test]
async fn shutdown_refuses_new_submissions() {
    let executor = ScriptedExecutor::new(vec![ScriptedExecutor::ok("eligible")]);
    let orchestrator = start(test_config(1), executor);

    let id = submit_run(&orchestrator, &submission("s")).unwrap().run_id;
    wait_for_status(&orchestrator, id, RunStatus::Completed).await;

    orchestrator.shutdown();
    assert!(submit_run(&orchestrator, &submission("late")).is_err());
    // Finished runs stay readable after shutdown.
    assert_eq!(orchestrator.status(id).unwrap().status, RunStatus::Completed);
}

/// An executor that panics on every call still finalizes each record.
#[tokio::test]
async fn bare_panicking_executor_finalizes() {
    let orchestrator = start(test_config(1), Arc::new(PanickingExecutor));
    let id = submit_run(&orchestrator, &submission("boom")).unwrap().run_id;
    wait_for_status(&orchestrator, id, RunStatus::Failed).await;
    assert_eq!(
        orchestrator.registry().get(id).unwrap().last_error,
        Some(ErrorKind::Internal)
    );
}
