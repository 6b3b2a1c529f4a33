//! Per-topic refresh cadence.

use std::time::Duration;

/// How one topic is refreshed.
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    /// Background poll interval.
    pub interval: Duration,
    /// Minimum spacing between two fetches; redundant triggers inside the
    /// window are collapsed.
    pub dedupe: Duration,
    /// Extra rounds through the supplier chain after the first one fails.
    pub max_retries: u32,
    /// Wait between retry rounds.
    pub retry_delay: Duration,
    /// Cap on how long any single supplier attempt may run.
    pub attempt_timeout: Duration,
}

impl RefreshPolicy {
    /// Interactive data the user is looking at (proxy tree, system proxy
    /// status): polled often, deduped tightly, few retries.
    pub fn fast() -> Self {
        Self {
            interval: Duration::from_secs(8),
            dedupe: Duration::from_secs(3),
            max_retries: 2,
            retry_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(10),
        }
    }

    /// Startup-sensitive data (base config, backend state): aggressive short
    /// interval and high retry count so it converges quickly while the
    /// backend is still coming up, with each attempt capped hard.
    pub fn slow_poll() -> Self {
        Self {
            interval: Duration::from_secs(3),
            dedupe: Duration::from_secs(5),
            max_retries: 5,
            retry_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}
