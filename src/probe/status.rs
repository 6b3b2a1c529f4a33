//! Probe status domain.
//!
//! A probe status is a plain `i64` so it travels unchanged between the
//! scheduler, listeners and presentation code. Negative values and very
//! large values are reserved sentinels; everything in between is a real
//! latency in milliseconds.

use std::time::SystemTime;

/// Never probed.
pub const UNTESTED: i64 = -1;
/// A probe is currently running.
pub const IN_FLIGHT: i64 = -2;
/// The local timeout fired before the backend answered.
pub const TIMEOUT: i64 = 0;
/// The backend call failed outright.
pub const ERROR_SENTINEL: i64 = 1_000_000;

/// Delays above this are displayed as errors rather than timeouts.
const ERROR_DISPLAY_FLOOR: i64 = 100_000;

/// Composite (group, name) identity of one probe target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeKey {
    pub group: String,
    pub name: String,
}

impl ProbeKey {
    pub fn new(group: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
        }
    }
}

/// One status observation for a target.
#[derive(Debug, Clone, Copy)]
pub struct ProbeUpdate {
    pub delay: i64,
    pub updated_at: SystemTime,
}

impl ProbeUpdate {
    pub fn now(delay: i64) -> Self {
        Self {
            delay,
            updated_at: SystemTime::now(),
        }
    }
}

/// Coarse quality band for a delay value, used by presentation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayBand {
    /// Untested or in flight.
    Inactive,
    /// Timeout or error.
    Bad,
    /// Usable but slow (>= 400 ms).
    Slow,
    /// Acceptable (>= 250 ms).
    Fair,
    /// Fast (< 250 ms).
    Fast,
}

/// Render a delay value for display.
pub fn format_delay(delay: i64, timeout_ms: i64) -> String {
    if delay == UNTESTED {
        return "-".to_string();
    }
    if delay == IN_FLIGHT {
        return "testing".to_string();
    }
    if delay == TIMEOUT || (delay >= timeout_ms && delay <= ERROR_DISPLAY_FLOOR) {
        return "Timeout".to_string();
    }
    if delay > ERROR_DISPLAY_FLOOR {
        return "Error".to_string();
    }
    delay.to_string()
}

/// Classify a delay value into a quality band.
pub fn delay_band(delay: i64, timeout_ms: i64) -> DelayBand {
    if delay < 0 {
        return DelayBand::Inactive;
    }
    if delay == TIMEOUT || delay >= timeout_ms || delay >= 10_000 {
        return DelayBand::Bad;
    }
    if delay >= 400 {
        return DelayBand::Slow;
    }
    if delay >= 250 {
        return DelayBand::Fair;
    }
    DelayBand::Fast
}
