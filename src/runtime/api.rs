//! API-facing request/response models.
//!
//! The HTTP transport itself is an external collaborator; these are the wire
//! shapes and thin functions a router binds to `POST /run`,
//! `GET /status/{run_id}`, and the dashboard data feed. Validation happens
//! here, before any record is created, so a malformed submission never mints
//! a `run_id`.

use serde::{Deserialize, Serialize};

use crate::core::error::OrchestratorError;
use crate::core::executor::RunRequest;
use crate::core::orchestrator::Orchestrator;
use crate::core::registry::{RunId, RunStatus};
use crate::core::reporter::DashboardSnapshot;

/// Body of `POST /run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSubmission {
    /// Portal account login.
    pub login: String,
    /// Portal account password.
    pub password: String,
    /// Identifier of the subject whose eligibility is checked.
    pub subject_id: String,
}

impl RunSubmission {
    /// Reject malformed submissions before any record exists.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Validation`] naming the blank field.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        for (name, value) in [
            ("login", &self.login),
            ("password", &self.password),
            ("subject_id", &self.subject_id),
        ] {
            if value.trim().is_empty() {
                return Err(OrchestratorError::Validation(format!(
                    "{name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Response of `POST /run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Identifier to poll `GET /status/{run_id}` with.
    pub run_id: RunId,
}

/// Response of `GET /status/{run_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Run identifier.
    pub run_id: RunId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Eligibility verdict, present once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Summary of the last attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_summary: Option<String>,
}

/// Validate a submission and hand it to the orchestrator.
///
/// Returns synchronously with a fresh `run_id` regardless of queue depth.
///
/// # Errors
///
/// [`OrchestratorError::Validation`] for malformed input (no record is
/// created), [`OrchestratorError::Shutdown`] once the orchestrator stopped.
pub fn submit_run(
    orchestrator: &Orchestrator,
    submission: &RunSubmission,
) -> Result<SubmitResponse, OrchestratorError> {
    submission.validate()?;
    let run_id = orchestrator.submit(RunRequest {
        login: submission.login.clone(),
        password: submission.password.clone(),
        subject_id: submission.subject_id.clone(),
        login_url: orchestrator.config().login_url.clone(),
    })?;
    Ok(SubmitResponse { run_id })
}

/// Current status of one run.
///
/// # Errors
///
/// [`OrchestratorError::NotFound`] for unknown ids.
pub fn run_status(
    orchestrator: &Orchestrator,
    run_id: RunId,
) -> Result<StatusResponse, OrchestratorError> {
    let report = orchestrator.status(run_id)?;
    Ok(StatusResponse {
        run_id: report.run_id,
        status: report.status,
        result: report.result,
        log_summary: report.log_summary,
    })
}

/// Read-only aggregate for the periodic dashboard poll.
#[must_use]
pub fn dashboard_data(orchestrator: &Orchestrator) -> DashboardSnapshot {
    orchestrator.dashboard()
}
