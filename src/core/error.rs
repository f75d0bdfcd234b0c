//! Error types for orchestrator operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by orchestrator components.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No record exists for the given run identifier.
    #[error("run {0} not found")]
    NotFound(Uuid),
    /// Submission rejected before a record was created.
    #[error("invalid submission: {0}")]
    Validation(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The orchestrator has been shut down and accepts no new work.
    #[error("orchestrator shut down")]
    Shutdown,
    /// A state transition that the run state machine forbids.
    #[error("illegal transition for run {run_id}: {from} -> {to}")]
    IllegalTransition {
        /// Run whose record refused the transition.
        run_id: Uuid,
        /// Status the record currently holds.
        from: &'static str,
        /// Status the caller attempted to set.
        to: &'static str,
    },
    /// Internal fault with context.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// Classification of executor failures.
///
/// The retry policy only looks at this kind; the message travels in
/// [`ExecError`] and ends up in the record's `log_summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or site instability; worth retrying.
    Transient,
    /// Invalid credentials or an unknown subject; retrying cannot help.
    InvalidInput,
    /// The portal answered but in a broken way; treated as transient.
    SiteError,
    /// The executor gave up waiting on the portal.
    Timeout,
    /// Worker-level fault (panic, runtime failure).
    Internal,
}

impl ErrorKind {
    /// Whether a failure of this kind may be re-attempted.
    ///
    /// Invalid input can never succeed on retry; an internal fault means the
    /// run's state is suspect, so it is finalized rather than replayed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::SiteError | Self::Timeout)
    }

    /// Stable lowercase name used in logs and status payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::InvalidInput => "invalid_input",
            Self::SiteError => "site_error",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

/// Typed failure returned by a [`RunExecutor`](crate::core::RunExecutor).
#[derive(Debug, Clone, Error)]
#[error("{} failure: {message}", kind.as_str())]
pub struct ExecError {
    /// Failure classification driving the retry decision.
    pub kind: ErrorKind,
    /// Human-readable context, surfaced in the record's log summary.
    pub message: String,
}

impl ExecError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Network or site instability.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Invalid credentials or unknown subject.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Broken portal response.
    pub fn site_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SiteError, message)
    }

    /// Executor-level wait expired.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Worker-level fault.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}
