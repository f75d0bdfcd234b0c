//! Periodic host CPU/memory sampling for admission decisions.
//!
//! The probe runs on its own task at a fixed interval and publishes
//! [`ResourceSnapshot`]s into a [`SnapshotCell`]. The cell is the only state
//! shared with the admission controller; the probe never reads admission
//! state. Snapshots are advisory and may be stale by one interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use psutil::cpu::CpuPercentCollector;
use serde::{Deserialize, Serialize};

use crate::core::scheduler::Spawn;
use crate::util::clock::now_ms;

/// One advisory measurement of host utilization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Host CPU utilization in `[0.0, 1.0]`.
    pub cpu_fraction: f64,
    /// Host memory utilization in `[0.0, 1.0]`.
    pub memory_fraction: f64,
    /// When the sample was taken (ms since epoch).
    pub sampled_at_ms: u128,
}

impl ResourceSnapshot {
    /// Whether the sample is older than `staleness`.
    #[must_use]
    pub fn is_stale(&self, staleness: Duration) -> bool {
        now_ms().saturating_sub(self.sampled_at_ms) > staleness.as_millis()
    }
}

/// Read-mostly handoff cell between the probe loop and its consumers.
///
/// Starts empty; consumers treat "no snapshot yet" the same as a stale one.
#[derive(Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<RwLock<Option<ResourceSnapshot>>>,
}

impl SnapshotCell {
    /// Create an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a fresh snapshot, replacing any previous one.
    pub fn publish(&self, snapshot: ResourceSnapshot) {
        *self.inner.write() = Some(snapshot);
    }

    /// Latest published snapshot, if any.
    #[must_use]
    pub fn latest(&self) -> Option<ResourceSnapshot> {
        *self.inner.read()
    }
}

/// Host utilization sampler backed by `psutil`.
///
/// CPU percent is measured since the previous call, so the first sample after
/// construction reflects the interval up to that point.
pub struct ResourceProbe {
    cpu: CpuPercentCollector,
}

impl ResourceProbe {
    /// Create a probe, priming the CPU collector.
    ///
    /// # Errors
    ///
    /// Fails if the platform CPU counters cannot be read.
    pub fn new() -> Result<Self, psutil::Error> {
        Ok(Self {
            cpu: CpuPercentCollector::new()?,
        })
    }

    /// Take one sample of host CPU and memory utilization.
    ///
    /// # Errors
    ///
    /// Fails if either counter cannot be read; the caller keeps the previous
    /// snapshot in that case.
    pub fn sample(&mut self) -> Result<ResourceSnapshot, psutil::Error> {
        let cpu_percent = self.cpu.cpu_percent()?;
        let memory = psutil::memory::virtual_memory()?;
        Ok(ResourceSnapshot {
            cpu_fraction: f64::from(cpu_percent) / 100.0,
            memory_fraction: f64::from(memory.percent()) / 100.0,
            sampled_at_ms: now_ms(),
        })
    }
}

/// Spawn the sampling loop on the given spawner.
///
/// The loop publishes into `cell` every `interval` until `shutdown` is set.
/// Sample failures are logged and leave the previous snapshot in place; it
/// will age out and the admission controller degrades to counter-only mode.
pub fn spawn_probe_loop<S: Spawn>(
    mut probe: ResourceProbe,
    cell: SnapshotCell,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    spawner: &S,
) {
    spawner.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if shutdown.load(Ordering::Acquire) {
                tracing::debug!("resource probe shutting down");
                break;
            }
            match probe.sample() {
                Ok(snapshot) => {
                    tracing::trace!(
                        cpu = snapshot.cpu_fraction,
                        memory = snapshot.memory_fraction,
                        "resource snapshot published"
                    );
                    cell.publish(snapshot);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "resource probe sample failed");
                }
            }
        }
    });
}
