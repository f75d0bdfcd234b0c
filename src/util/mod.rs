//! Shared utilities.

/// Wall-clock helpers in milliseconds since epoch.
pub mod clock;
/// Tracing initialization helpers.
pub mod telemetry;

pub use clock::{elapsed_ms, now_ms};
pub use telemetry::init_tracing;
