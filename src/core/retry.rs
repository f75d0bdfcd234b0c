//! Retry policy: turns a classified executor failure into a decision.
//!
//! Retry is an explicit policy object, decoupled from both the executor and
//! the scheduler. Terminal error kinds bypass retry entirely regardless of
//! remaining attempts; retryable kinds are granted a delayed re-queue while
//! `attempt < max_attempts`, with a monotonically non-decreasing backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::ErrorKind;

/// Exponential backoff with a cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    pub initial: Duration,
    /// Growth factor per attempt (typically 2.0).
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            multiplier: 2.0,
            max: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before re-queueing after the given attempt (1-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        #[allow(clippy::cast_possible_wrap)]
        let factor = self.multiplier.powi(exponent as i32);
        let delay = self.initial.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max.as_secs_f64()))
    }
}

/// Decision for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue the run after the given delay.
    Retry {
        /// Backoff to wait before the run re-enters the pending queue.
        after: Duration,
    },
    /// Finalize the run as `Failed`; no further attempts.
    Terminal,
}

/// Policy deciding whether a failed run is re-attempted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RetryPolicy {
    /// Build a policy granting at most `max_attempts` total attempts.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Attempts cap this policy enforces.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide the fate of a run that just failed its `attempt`-th try.
    ///
    /// Terminal kinds never retry. Retryable kinds retry while attempts
    /// remain; exhaustion converts the failure into a terminal one.
    #[must_use]
    pub fn on_failure(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::Terminal;
        }
        if attempt >= self.max_attempts {
            tracing::debug!(attempt, kind = kind.as_str(), "retry budget exhausted");
            return RetryDecision::Terminal;
        }
        RetryDecision::Retry {
            after: self.backoff.delay(attempt),
        }
    }
}
