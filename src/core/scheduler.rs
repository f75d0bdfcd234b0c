//! Worker pool pulling pending runs FIFO and driving the executor.
//!
//! The pending queue is an unbounded mpsc channel: submission never rejects
//! on load, it only delays. `max_concurrent_runs` worker tasks share the
//! receiver behind an async mutex, so dispatch order is strictly arrival
//! order. Each worker gates on the admission controller before starting a
//! run, spawns the executor call as its own task (a panic becomes a caught
//! `JoinError`, never a leaked `Running` record), bounds it with the hard
//! timeout, and feeds failures through the retry policy.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::OrchestratorConfig;
use crate::core::admission::{AdmissionController, AdmissionDecision};
use crate::core::error::{ErrorKind, ExecError, OrchestratorError};
use crate::core::executor::{RunExecutor, RunOutcome, RunRequest};
use crate::core::registry::{RunId, RunRegistry, RunStatus};
use crate::core::retry::{RetryDecision, RetryPolicy};

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that runs to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// One pending run on the scheduler queue.
///
/// The request rides on the queue rather than in the registry so credentials
/// never appear in pollable state.
#[derive(Debug, Clone)]
pub struct QueuedRun {
    /// Identifier of the registry record this run belongs to.
    pub run_id: RunId,
    /// Immutable request payload, shared across retry re-queues.
    pub request: Arc<RunRequest>,
}

type SenderSlot = Arc<Mutex<Option<UnboundedSender<QueuedRun>>>>;

/// Shared state every worker operates on.
struct WorkerContext<S: Spawn> {
    registry: Arc<RunRegistry>,
    admission: Arc<AdmissionController>,
    retry: RetryPolicy,
    executor: Arc<dyn RunExecutor>,
    sender: SenderSlot,
    spawner: S,
    run_timeout: Duration,
    admission_retry_delay: Duration,
    shutdown: Arc<AtomicBool>,
}

/// Concurrency-bounded worker pool over the pending-run queue.
pub struct Scheduler {
    sender: SenderSlot,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    /// Start `max_concurrent_runs` workers on the given spawner.
    pub fn start<S>(
        config: &OrchestratorConfig,
        registry: Arc<RunRegistry>,
        admission: Arc<AdmissionController>,
        retry: RetryPolicy,
        executor: Arc<dyn RunExecutor>,
        spawner: S,
    ) -> Self
    where
        S: Spawn + Clone + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<QueuedRun>();
        let sender: SenderSlot = Arc::new(Mutex::new(Some(tx)));
        let receiver = Arc::new(tokio::sync::Mutex::new(rx));
        let shutdown = Arc::new(AtomicBool::new(false));

        let context = Arc::new(WorkerContext {
            registry,
            admission,
            retry,
            executor,
            sender: Arc::clone(&sender),
            spawner: spawner.clone(),
            run_timeout: config.run_timeout,
            admission_retry_delay: config.admission_retry_delay,
            shutdown: Arc::clone(&shutdown),
        });

        for worker_id in 0..config.max_concurrent_runs {
            let receiver = Arc::clone(&receiver);
            let context = Arc::clone(&context);
            spawner.spawn(async move {
                worker_loop(worker_id, receiver, context).await;
            });
        }

        tracing::info!(
            workers = config.max_concurrent_runs,
            run_timeout_secs = config.run_timeout.as_secs(),
            "scheduler started"
        );

        Self { sender, shutdown }
    }

    /// Put a run on the pending queue.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Shutdown`] once the scheduler stopped.
    pub fn enqueue(&self, run: QueuedRun) -> Result<(), OrchestratorError> {
        let guard = self.sender.lock();
        let tx = guard.as_ref().ok_or(OrchestratorError::Shutdown)?;
        tx.send(run).map_err(|_| OrchestratorError::Shutdown)
    }

    /// Stop accepting runs and let workers drain out.
    ///
    /// Workers finish their in-flight run, then exit when the queue closes.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.sender.lock() = None;
        tracing::info!("scheduler shutting down");
    }
}

async fn worker_loop<S: Spawn>(
    worker_id: u32,
    receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<QueuedRun>>>,
    context: Arc<WorkerContext<S>>,
) {
    tracing::debug!(worker_id, "worker started");
    loop {
        // Holding the receiver lock across recv serializes dequeues, which
        // is exactly the FIFO guarantee.
        let next = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(run) = next else {
            tracing::debug!(worker_id, "queue closed, worker exiting");
            break;
        };
        process_run(worker_id, &context, run).await;
    }
}

/// Drive one run from admission through finalization or re-queue.
async fn process_run<S: Spawn>(worker_id: u32, context: &WorkerContext<S>, run: QueuedRun) {
    // Admission gate: the run stays Queued while deferred.
    loop {
        if context.shutdown.load(Ordering::Acquire) {
            tracing::debug!(run_id = %run.run_id, "shutdown while awaiting admission");
            return;
        }
        match context.admission.try_admit() {
            AdmissionDecision::Admitted => break,
            AdmissionDecision::Deferred(reason) => {
                tracing::trace!(run_id = %run.run_id, ?reason, "admission deferred");
                tokio::time::sleep(context.admission_retry_delay).await;
            }
        }
    }

    // From here the slot is held; release on every path below.
    if let Err(e) = mark_running(context, run.run_id) {
        tracing::error!(run_id = %run.run_id, error = %e, "failed to mark run running");
        context.admission.release();
        return;
    }

    tracing::info!(worker_id, run_id = %run.run_id, "run started");
    let verdict = invoke_executor(context, &run).await;
    match verdict {
        ExecutorVerdict::Completed(outcome) => finalize_completed(context, run.run_id, outcome),
        ExecutorVerdict::HardTimeout => finalize_hard_timeout(context, run.run_id),
        ExecutorVerdict::Failed(error) => handle_failure(context, &run, &error),
    }
    context.admission.release();
}

enum ExecutorVerdict {
    Completed(RunOutcome),
    Failed(ExecError),
    HardTimeout,
}

/// Run the executor isolated in its own task, bounded by the hard timeout.
async fn invoke_executor<S: Spawn>(context: &WorkerContext<S>, run: &QueuedRun) -> ExecutorVerdict {
    let executor = Arc::clone(&context.executor);
    let request = (*run.request).clone();
    let mut handle = tokio::spawn(async move { executor.execute(request).await });

    match tokio::time::timeout(context.run_timeout, &mut handle).await {
        Err(_elapsed) => {
            // Hard ceiling: cancel the invocation and reclaim the slot.
            handle.abort();
            tracing::warn!(run_id = %run.run_id, "run exceeded hard timeout, aborted");
            ExecutorVerdict::HardTimeout
        }
        Ok(Err(join_error)) => {
            tracing::error!(run_id = %run.run_id, error = %join_error, "executor task crashed");
            ExecutorVerdict::Failed(ExecError::internal(format!(
                "executor task crashed: {join_error}"
            )))
        }
        Ok(Ok(Ok(outcome))) => ExecutorVerdict::Completed(outcome),
        Ok(Ok(Err(error))) => ExecutorVerdict::Failed(error),
    }
}

fn mark_running<S: Spawn>(
    context: &WorkerContext<S>,
    run_id: RunId,
) -> Result<(), OrchestratorError> {
    context
        .registry
        .update(run_id, |record| record.transition_to(RunStatus::Running))?
}

fn finalize_completed<S: Spawn>(context: &WorkerContext<S>, run_id: RunId, outcome: RunOutcome) {
    let applied = context.registry.update(run_id, |record| {
        record.result = Some(outcome.result.clone());
        record.log_summary = Some(outcome.log_summary.clone());
        record.transition_to(RunStatus::Completed)
    });
    match applied {
        Ok(Ok(())) => tracing::info!(run_id = %run_id, "run completed"),
        Ok(Err(e)) | Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "failed to finalize completion");
        }
    }
}

/// The hard ceiling bypasses the retry policy: the run is force-failed with
/// `Timeout` so a wedged browser session cannot occupy slots for hours.
fn finalize_hard_timeout<S: Spawn>(context: &WorkerContext<S>, run_id: RunId) {
    let applied = context.registry.update(run_id, |record| {
        record.last_error = Some(ErrorKind::Timeout);
        record.log_summary = Some("run exceeded the configured hard timeout".to_string());
        record.transition_to(RunStatus::Failed)
    });
    if let Ok(Err(e)) | Err(e) = applied {
        tracing::error!(run_id = %run_id, error = %e, "failed to finalize timeout");
    }
}

/// Classify a failure through the retry policy and either finalize the run
/// or schedule its delayed re-queue.
fn handle_failure<S: Spawn>(context: &WorkerContext<S>, run: &QueuedRun, error: &ExecError) {
    let run_id = run.run_id;
    let decided = context.registry.update(run_id, |record| {
        record.last_error = Some(error.kind);
        record.log_summary = Some(error.message.clone());
        match context.retry.on_failure(record.attempt, error.kind) {
            RetryDecision::Terminal => {
                record.transition_to(RunStatus::Failed)?;
                Ok(None)
            }
            RetryDecision::Retry { after } => {
                record.transition_to(RunStatus::Retrying)?;
                record.attempt += 1;
                Ok(Some(after))
            }
        }
    });

    let delay = match decided {
        Ok(Ok(delay)) => delay,
        Ok(Err(e)) | Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "failed to record failure");
            return;
        }
    };

    match delay {
        None => {
            tracing::info!(
                run_id = %run_id,
                kind = error.kind.as_str(),
                "run failed terminally"
            );
        }
        Some(after) => {
            tracing::info!(
                run_id = %run_id,
                kind = error.kind.as_str(),
                delay_ms = after.as_millis() as u64,
                "retry granted"
            );
            schedule_requeue(context, run.clone(), after);
        }
    }
}

/// After the backoff elapses, flip the record back to `Queued` and put the
/// run on the pending queue again.
fn schedule_requeue<S: Spawn>(context: &WorkerContext<S>, run: QueuedRun, after: Duration) {
    let registry = Arc::clone(&context.registry);
    let sender = Arc::clone(&context.sender);
    context.spawner.spawn(async move {
        tokio::time::sleep(after).await;

        let requeued = registry.update(run.run_id, |record| {
            record.transition_to(RunStatus::Queued)
        });
        if let Ok(Err(e)) | Err(e) = requeued {
            tracing::error!(run_id = %run.run_id, error = %e, "failed to re-queue run");
            return;
        }

        let sent = {
            let guard = sender.lock();
            match guard.as_ref() {
                Some(tx) => tx.send(run.clone()).is_ok(),
                None => false,
            }
        };
        if !sent {
            // Scheduler went away between the backoff and the re-queue.
            tracing::warn!(run_id = %run.run_id, "scheduler shut down, failing retry");
            let failed = registry.update(run.run_id, |record| {
                record.last_error = Some(ErrorKind::Internal);
                record.log_summary = Some("orchestrator shut down before retry".to_string());
                record.transition_to(RunStatus::Failed)
            });
            if let Ok(Err(e)) | Err(e) = failed {
                tracing::error!(run_id = %run.run_id, error = %e, "failed to fail retry");
            }
        }
    });
}
