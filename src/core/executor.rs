//! The executor contract: the opaque browser-driving capability.
//!
//! The orchestrator never looks inside an executor. It hands over an
//! immutable [`RunRequest`], awaits either a [`RunOutcome`] or a typed
//! [`ExecError`], and treats that await as the single suspension point of a
//! run. Invocations are isolated in their own task and bounded by the
//! configured hard timeout; see the scheduler.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::ExecError;

/// Immutable payload of one run: portal credentials and the subject to check.
///
/// `Debug` redacts credentials so request values can travel through tracing
/// fields without leaking secrets.
#[derive(Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Portal account login.
    pub login: String,
    /// Portal account password.
    pub password: String,
    /// Identifier of the subject whose eligibility is checked.
    pub subject_id: String,
    /// Base URL of the portal login page.
    pub login_url: String,
}

impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("login", &"<redacted>")
            .field("password", &"<redacted>")
            .field("subject_id", &self.subject_id)
            .field("login_url", &self.login_url)
            .finish()
    }
}

/// Successful result of one executor invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Eligibility verdict text, surfaced to pollers as `result`.
    pub result: String,
    /// Step-by-step summary of what the automation did.
    pub log_summary: String,
}

/// Opaque capability that performs the browser-driven portal interaction.
///
/// Implementations may take tens of seconds per call. They must be safe to
/// drop mid-flight: the scheduler aborts invocations that exceed the hard
/// timeout.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use run_orchestrator::core::{ExecError, RunExecutor, RunOutcome, RunRequest};
///
/// struct PortalExecutor;
///
/// #[async_trait]
/// impl RunExecutor for PortalExecutor {
///     async fn execute(&self, request: RunRequest) -> Result<RunOutcome, ExecError> {
///         // drive the headless browser: login, navigate, check eligibility
///         Ok(RunOutcome {
///             result: "eligible".into(),
///             log_summary: "login ok; subject found; eligible".into(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait RunExecutor: Send + Sync {
    /// Perform one eligibility check for the given request.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] whose kind drives the retry decision.
    async fn execute(&self, request: RunRequest) -> Result<RunOutcome, ExecError>;
}
