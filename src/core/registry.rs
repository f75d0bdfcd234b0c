//! In-memory run-state registry.
//!
//! The registry is the single authority on run state: every mutation goes
//! through [`RunRegistry::update`], which holds the per-record mutex for the
//! duration of the closure so a concurrent read never observes a torn write.
//! Records live for the lifetime of the process; there is no persistence, and
//! a restart loses all history by design.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{ErrorKind, OrchestratorError};
use crate::util::clock::now_ms;

/// Unique identifier of one run.
pub type RunId = Uuid;

/// Status of a run in the orchestrator lifecycle.
///
/// Transitions are monotonic: `Queued -> Running -> {Completed | Failed}`,
/// with the bounded retry loop `Running -> Retrying -> Queued`. Nothing
/// leaves `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for a worker and an admission slot.
    Queued,
    /// An executor invocation is in flight.
    Running,
    /// A retry was granted; the run re-enters the queue after its backoff.
    Retrying,
    /// Terminal: the executor produced a result.
    Completed,
    /// Terminal: non-retryable failure or attempts exhausted.
    Failed,
}

impl RunStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable lowercase name matching the wire encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Retrying)
                | (Self::Retrying, Self::Queued)
                // A queued or retrying run can be force-failed at shutdown
                // or by a worker fault before its executor ever started.
                | (Self::Queued, Self::Failed)
                | (Self::Retrying, Self::Failed)
        )
    }
}

/// Authoritative state of one run.
///
/// `run_id` and `submitted_at_ms` are immutable; everything else is mutated
/// only by the scheduler and retry policy through [`RunRegistry::update`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier.
    pub run_id: RunId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Attempt number, starting at 1 and capped at `max_attempts`.
    pub attempt: u32,
    /// Submission timestamp (ms since epoch).
    pub submitted_at_ms: u128,
    /// When the first executor invocation started, if any.
    pub started_at_ms: Option<u128>,
    /// When the run reached a terminal status, if it has.
    pub finished_at_ms: Option<u128>,
    /// Executor result text, present once `Completed`.
    pub result: Option<String>,
    /// Human-readable summary of the last attempt.
    pub log_summary: Option<String>,
    /// Classification of the most recent failure, if any.
    pub last_error: Option<ErrorKind>,
}

impl RunRecord {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            status: RunStatus::Queued,
            attempt: 1,
            submitted_at_ms: now_ms(),
            started_at_ms: None,
            finished_at_ms: None,
            result: None,
            log_summary: None,
            last_error: None,
        }
    }

    /// Apply a status transition, enforcing the state machine.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::IllegalTransition`] if the move is not
    /// permitted (in particular, any move out of a terminal status).
    pub fn transition_to(&mut self, next: RunStatus) -> Result<(), OrchestratorError> {
        if !self.status.can_transition_to(next) {
            return Err(OrchestratorError::IllegalTransition {
                run_id: self.run_id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        match next {
            RunStatus::Running => {
                if self.started_at_ms.is_none() {
                    self.started_at_ms = Some(now_ms());
                }
            }
            RunStatus::Completed | RunStatus::Failed => {
                self.finished_at_ms = Some(now_ms());
            }
            RunStatus::Queued | RunStatus::Retrying => {}
        }
        Ok(())
    }
}

/// In-memory registry of run records.
///
/// Layout follows the read-heavy map pattern: an `RwLock` over the id map
/// with each record behind its own `Mutex`. Lookups take the read lock
/// briefly; mutations serialize on the per-record mutex only, so updates to
/// different runs never contend.
#[derive(Default)]
pub struct RunRegistry {
    records: RwLock<HashMap<RunId, Arc<Mutex<RunRecord>>>>,
}

impl RunRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh run id and create its record in status `Queued`.
    pub fn create(&self) -> RunId {
        let run_id = Uuid::new_v4();
        let record = RunRecord::new(run_id);
        self.records
            .write()
            .insert(run_id, Arc::new(Mutex::new(record)));
        tracing::debug!(%run_id, "run record created");
        run_id
    }

    /// Snapshot the current state of one record.
    ///
    /// Terminal records stay readable for the process lifetime; only an id
    /// that was never minted yields `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for unknown ids.
    pub fn get(&self, run_id: RunId) -> Result<RunRecord, OrchestratorError> {
        let entry = self
            .records
            .read()
            .get(&run_id)
            .cloned()
            .ok_or(OrchestratorError::NotFound(run_id))?;
        let record = entry.lock();
        Ok(record.clone())
    }

    /// Apply an atomic mutation to one record under its mutex.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for unknown ids; the closure's
    /// own return value is passed through on success.
    pub fn update<R>(
        &self,
        run_id: RunId,
        mutator: impl FnOnce(&mut RunRecord) -> R,
    ) -> Result<R, OrchestratorError> {
        let entry = self
            .records
            .read()
            .get(&run_id)
            .cloned()
            .ok_or(OrchestratorError::NotFound(run_id))?;
        let mut record = entry.lock();
        Ok(mutator(&mut record))
    }

    /// Snapshot every record, for dashboard aggregation.
    #[must_use]
    pub fn list(&self) -> Vec<RunRecord> {
        let entries: Vec<_> = self.records.read().values().cloned().collect();
        entries.iter().map(|e| e.lock().clone()).collect()
    }

    /// Number of records ever created in this process.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no run was ever submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_starts_queued_at_attempt_one() {
        let registry = RunRegistry::new();
        let id = registry.create();
        let record = registry.get(id).unwrap();
        assert_eq!(record.status, RunStatus::Queued);
        assert_eq!(record.attempt, 1);
        assert!(record.started_at_ms.is_none());
        assert!(record.finished_at_ms.is_none());
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let registry = RunRegistry::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.get(missing),
            Err(OrchestratorError::NotFound(id)) if id == missing
        ));
    }

    #[test]
    fn ids_are_unique() {
        let registry = RunRegistry::new();
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn update_mutates_atomically() {
        let registry = RunRegistry::new();
        let id = registry.create();
        registry
            .update(id, |rec| rec.transition_to(RunStatus::Running))
            .unwrap()
            .unwrap();
        assert_eq!(registry.get(id).unwrap().status, RunStatus::Running);
        assert!(registry.get(id).unwrap().started_at_ms.is_some());
    }

    #[test]
    fn terminal_states_are_immutable() {
        let registry = RunRegistry::new();
        let id = registry.create();
        registry
            .update(id, |rec| {
                rec.transition_to(RunStatus::Running)?;
                rec.transition_to(RunStatus::Completed)
            })
            .unwrap()
            .unwrap();

        let err = registry
            .update(id, |rec| rec.transition_to(RunStatus::Queued))
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::IllegalTransition { .. }));
        // Terminal record is still readable.
        assert_eq!(registry.get(id).unwrap().status, RunStatus::Completed);
    }

    #[test]
    fn retry_loop_transitions_are_legal() {
        let mut record = RunRecord::new(Uuid::new_v4());
        record.transition_to(RunStatus::Running).unwrap();
        record.transition_to(RunStatus::Retrying).unwrap();
        record.transition_to(RunStatus::Queued).unwrap();
        record.transition_to(RunStatus::Running).unwrap();
        record.transition_to(RunStatus::Failed).unwrap();
        assert!(record.transition_to(RunStatus::Running).is_err());
    }

    #[test]
    fn started_at_is_set_once() {
        let mut record = RunRecord::new(Uuid::new_v4());
        record.transition_to(RunStatus::Running).unwrap();
        let first = record.started_at_ms;
        record.transition_to(RunStatus::Retrying).unwrap();
        record.transition_to(RunStatus::Queued).unwrap();
        record.transition_to(RunStatus::Running).unwrap();
        assert_eq!(record.started_at_ms, first);
    }

    #[test]
    fn list_snapshots_all_records() {
        let registry = RunRegistry::new();
        let a = registry.create();
        let b = registry.create();
        let ids: Vec<RunId> = registry.list().iter().map(|r| r.run_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a));
        assert!(ids.contains(&b));
    }
}
