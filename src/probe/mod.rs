//! Latency probing.

pub mod scheduler;
pub mod status;

pub use scheduler::{
    ProbeListener, ProbeScheduler, DEFAULT_PROBE_CONCURRENCY, DEFAULT_TEST_URL, MAX_PROBE_WORKERS,
};
pub use status::{
    delay_band, format_delay, DelayBand, ProbeKey, ProbeUpdate, ERROR_SENTINEL, IN_FLIGHT,
    TIMEOUT, UNTESTED,
};
