//! Observability helpers.
//!
//! Logging uses `tracing` directly at call sites; this module only carries
//! the metric recording shims.

pub mod metrics;
