//! Runtime adapters and the API-facing surface.

/// Wire models and thin handlers for the submit/poll/dashboard protocol.
pub mod api;
/// Tokio-backed [`Spawn`](crate::core::Spawn) implementation.
pub mod tokio_spawner;

pub use api::{dashboard_data, run_status, submit_run, RunSubmission, StatusResponse, SubmitResponse};
pub use tokio_spawner::TokioSpawner;
