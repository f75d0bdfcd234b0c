//! Read-only projections of registry state for pollers and the dashboard.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::error::OrchestratorError;
use crate::core::probe::{ResourceSnapshot, SnapshotCell};
use crate::core::registry::{RunId, RunRegistry, RunStatus};
use crate::util::clock::elapsed_ms;

/// Poller-facing view of one run.
///
/// Pure projection of the committed record; repeated reads with no
/// intervening state change return identical payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Eligibility verdict, present once completed.
    pub result: Option<String>,
    /// Summary of the last attempt.
    pub log_summary: Option<String>,
}

/// Elapsed-time entry for one non-terminal run on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunElapsed {
    /// Run identifier.
    pub run_id: RunId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Milliseconds since the run started, or since submission if it has
    /// not started yet.
    pub elapsed_ms: u128,
}

/// Aggregate state for the periodic dashboard poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Runs currently executing.
    pub active: usize,
    /// Runs waiting for a worker or an admission slot.
    pub queued: usize,
    /// Runs waiting out a retry backoff.
    pub retrying: usize,
    /// Runs finished successfully.
    pub completed: usize,
    /// Runs finished in failure.
    pub failed: usize,
    /// Configured concurrency cap.
    pub max_concurrent_runs: u32,
    /// Slots free under the cap right now.
    pub available_slots: u32,
    /// Latest resource probe sample, if one was taken.
    pub resource: Option<ResourceSnapshot>,
    /// Per-run elapsed time for every non-terminal run.
    pub runs: Vec<RunElapsed>,
}

/// Read-only reporting surface over the registry.
pub struct StatusReporter {
    registry: Arc<RunRegistry>,
    snapshots: SnapshotCell,
    max_concurrent_runs: u32,
}

impl StatusReporter {
    /// Build a reporter over the given registry and probe cell.
    #[must_use]
    pub fn new(
        registry: Arc<RunRegistry>,
        snapshots: SnapshotCell,
        max_concurrent_runs: u32,
    ) -> Self {
        Self {
            registry,
            snapshots,
            max_concurrent_runs,
        }
    }

    /// Project the current state of one run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for ids that were never
    /// minted. Finished runs are a normal, always-readable terminal state.
    pub fn report(&self, run_id: RunId) -> Result<StatusReport, OrchestratorError> {
        let record = self.registry.get(run_id)?;
        Ok(StatusReport {
            run_id: record.run_id,
            status: record.status,
            result: record.result,
            log_summary: record.log_summary,
        })
    }

    /// Aggregate registry state for the dashboard feed.
    ///
    /// `running_now` is the live admission counter, passed in so the
    /// reporter stays a pure read of registry plus probe state.
    #[must_use]
    pub fn dashboard(&self, running_now: u32) -> DashboardSnapshot {
        let records = self.registry.list();
        let mut snapshot = DashboardSnapshot {
            active: 0,
            queued: 0,
            retrying: 0,
            completed: 0,
            failed: 0,
            max_concurrent_runs: self.max_concurrent_runs,
            available_slots: self.max_concurrent_runs.saturating_sub(running_now),
            resource: self.snapshots.latest(),
            runs: Vec::new(),
        };

        for record in records {
            match record.status {
                RunStatus::Running => snapshot.active += 1,
                RunStatus::Queued => snapshot.queued += 1,
                RunStatus::Retrying => snapshot.retrying += 1,
                RunStatus::Completed => snapshot.completed += 1,
                RunStatus::Failed => snapshot.failed += 1,
            }
            if !record.status.is_terminal() {
                let since = record.started_at_ms.unwrap_or(record.submitted_at_ms);
                snapshot.runs.push(RunElapsed {
                    run_id: record.run_id,
                    status: record.status,
                    elapsed_ms: elapsed_ms(since),
                });
            }
        }
        snapshot
    }
}
