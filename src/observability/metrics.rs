//! Metric recording helpers.
//!
//! Thin wrappers over the `metrics` facade so call sites stay one-liners.
//! Wiring an exporter is the host application's decision; without one these
//! are no-ops.

use metrics::counter;

use crate::probe::status::{ERROR_SENTINEL, TIMEOUT};

/// Count one terminal probe outcome.
pub fn record_probe_outcome(delay: i64) {
    let outcome = if delay == TIMEOUT {
        "timeout"
    } else if delay >= ERROR_SENTINEL {
        "error"
    } else {
        "ok"
    };
    counter!("live_probe_outcomes_total", "outcome" => outcome).increment(1);
}

/// Count one topic refresh attempt.
pub fn record_topic_refresh(topic: &'static str, success: bool) {
    let result = if success { "ok" } else { "exhausted" };
    counter!("live_topic_refreshes_total", "topic" => topic, "result" => result).increment(1);
}

/// Count one node-switch request dropped because another was pending.
pub fn record_selection_dropped() {
    counter!("live_selection_dropped_total").increment(1);
}
