//! Admission control: decides whether a pending run may start now.
//!
//! Two gates, in order: a lock-free concurrency slot (CAS on an atomic
//! counter, bounded by `max_concurrent_runs`) and an advisory resource check
//! against the latest [`ResourceSnapshot`]. A missing or stale snapshot
//! degrades admission to counter-only rather than failing closed. Deferral is
//! not an error: the run stays queued and the caller retries later.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::OrchestratorConfig;
use crate::core::probe::SnapshotCell;

/// Why an admission attempt was deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// All concurrency slots are occupied.
    AtCapacity,
    /// The latest snapshot shows no headroom for another run.
    ResourcePressure,
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// A slot was reserved; the caller must `release()` it when done.
    Admitted,
    /// No capacity right now; try again later.
    Deferred(DeferReason),
}

/// Concurrency- and resource-aware admission gate.
pub struct AdmissionController {
    max_concurrent: u32,
    running: AtomicU32,
    snapshots: SnapshotCell,
    per_run_cpu_budget: f64,
    per_run_memory_budget: f64,
    snapshot_staleness: Duration,
}

impl AdmissionController {
    /// Build a controller from config and the probe's snapshot cell.
    #[must_use]
    pub fn new(config: &OrchestratorConfig, snapshots: SnapshotCell) -> Self {
        Self {
            max_concurrent: config.max_concurrent_runs,
            running: AtomicU32::new(0),
            snapshots,
            per_run_cpu_budget: config.per_run_cpu_budget,
            per_run_memory_budget: config.per_run_memory_budget,
            snapshot_staleness: config.snapshot_staleness,
        }
    }

    /// Attempt to admit one run.
    ///
    /// On `Admitted` a concurrency slot is already reserved; the caller owns
    /// it until [`release`](Self::release).
    pub fn try_admit(&self) -> AdmissionDecision {
        if !self.has_resource_headroom() {
            return AdmissionDecision::Deferred(DeferReason::ResourcePressure);
        }
        if self.try_reserve_slot() {
            AdmissionDecision::Admitted
        } else {
            AdmissionDecision::Deferred(DeferReason::AtCapacity)
        }
    }

    /// Return a previously reserved slot.
    pub fn release(&self) {
        let prev = self.running.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release without a matching admit");
    }

    /// Number of runs currently holding a slot.
    #[must_use]
    pub fn running(&self) -> u32 {
        self.running.load(Ordering::Acquire)
    }

    /// Slots still free under the concurrency cap.
    #[must_use]
    pub fn available_slots(&self) -> u32 {
        self.max_concurrent.saturating_sub(self.running())
    }

    /// Advisory resource gate.
    ///
    /// Headroom model: one more run must fit inside the host budget, so
    /// `fraction + per_run_budget <= 1.0` for both CPU and memory. Missing
    /// or stale snapshots pass the gate (counter-only fallback).
    fn has_resource_headroom(&self) -> bool {
        let Some(snapshot) = self.snapshots.latest() else {
            return true;
        };
        if snapshot.is_stale(self.snapshot_staleness) {
            tracing::debug!("resource snapshot stale, admitting on counter alone");
            return true;
        }
        let cpu_ok = snapshot.cpu_fraction + self.per_run_cpu_budget <= 1.0;
        let memory_ok = snapshot.memory_fraction + self.per_run_memory_budget <= 1.0;
        if !cpu_ok || !memory_ok {
            tracing::debug!(
                cpu = snapshot.cpu_fraction,
                memory = snapshot.memory_fraction,
                "admission deferred on resource pressure"
            );
        }
        cpu_ok && memory_ok
    }

    /// Reserve a slot with a CAS loop, never exceeding the cap.
    fn try_reserve_slot(&self) -> bool {
        let mut current = self.running.load(Ordering::Acquire);
        loop {
            if current >= self.max_concurrent {
                return false;
            }
            match self.running.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}
