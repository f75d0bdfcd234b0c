//! # Run Orchestrator
//!
//! A concurrency-bounded orchestrator for browser-driven eligibility checks.
//!
//! Each run drives a headless-browser session against an external web portal
//! and may take tens of seconds. The hard problem is not clicking buttons —
//! that lives behind the opaque [`core::RunExecutor`] capability — but safely
//! admitting, bounding, retrying, and tracking many such long-running,
//! resource-heavy jobs submitted concurrently through a submit/poll API
//! without overrunning host CPU/memory budgets.
//!
//! ## Components
//!
//! - **Registry** — authoritative in-memory state per run; all mutation is
//!   serialized per record.
//! - **Resource probe** — periodic advisory snapshot of host CPU/memory.
//! - **Admission controller** — concurrency slots plus resource headroom;
//!   degrades to counter-only when the probe goes stale.
//! - **Scheduler** — FIFO worker pool, one isolated executor invocation per
//!   run, bounded by a hard timeout.
//! - **Retry policy** — transient failures re-queue with capped exponential
//!   backoff; terminal failures finalize immediately.
//! - **Status reporter** — read-only projections for pollers and the
//!   dashboard feed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use run_orchestrator::config::OrchestratorConfig;
//! use run_orchestrator::core::Orchestrator;
//! use run_orchestrator::runtime::{submit_run, run_status, RunSubmission};
//!
//! let config = OrchestratorConfig::from_env()?;
//! let orchestrator = Orchestrator::with_tokio(config, Arc::new(PortalExecutor::new()))?;
//!
//! let submitted = submit_run(&orchestrator, &RunSubmission {
//!     login: "user".into(),
//!     password: "secret".into(),
//!     subject_id: "123.456.789-00".into(),
//! })?;
//!
//! // Poll until terminal.
//! let status = run_status(&orchestrator, submitted.run_id)?;
//! ```
//!
//! Runs are not persisted: a process restart loses all history. That is a
//! documented limitation, not a defect.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

/// Configuration models and environment loading.
pub mod config;
/// Core orchestration: registry, admission, scheduling, retry, reporting.
pub mod core;
/// Runtime adapters and the API-facing surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
