//! Bounded-concurrency latency probe scheduler.
//!
//! # Responsibilities
//! - Run latency probes against named targets via the command gateway
//! - Track the latest status per (group, name) pair
//! - Fan each status change out to at most one listener per pair
//!
//! # Design Decisions
//! - Listener delivery always happens on a later scheduling turn, through a
//!   single dispatcher task, so listener code never reenters the caller that
//!   produced the status change
//! - A timed-out gateway call is abandoned, not cancelled: the call runs as
//!   its own task and its late result is discarded
//! - Batch concurrency is hard-capped at 10 regardless of what the caller
//!   asks for; the probe endpoint is a shared, rate-sensitive resource

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::gateway::CommandGateway;
use crate::observability::metrics;
use crate::probe::status::{ProbeKey, ProbeUpdate, ERROR_SENTINEL, IN_FLIGHT, TIMEOUT, UNTESTED};

/// Connectivity-check endpoint used when no URL was set for a group.
pub const DEFAULT_TEST_URL: &str = "https://cp.cloudflare.com/generate_204";

/// Concurrency requested for batch sweeps when the caller does not care.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 36;

/// Hard ceiling on concurrent probes within one batch.
pub const MAX_PROBE_WORKERS: usize = 10;

/// Minimum wall time between the in-flight and terminal status of one probe.
const STATUS_FLOOR: Duration = Duration::from_millis(500);

/// Upper bound of the random delay inserted between a worker's probes.
const MAX_JITTER_MS: u64 = 200;

/// Callback invoked with every status change for a registered pair.
pub type ProbeListener = Arc<dyn Fn(ProbeUpdate) + Send + Sync>;

struct SchedulerInner {
    gateway: Arc<dyn CommandGateway>,
    /// Per-group test URL overrides.
    urls: DashMap<String, String>,
    /// One listener slot per target; latest registration wins.
    listeners: DashMap<ProbeKey, ProbeListener>,
    /// Latest observed status per target. Never cleared by unregistration.
    statuses: DashMap<ProbeKey, ProbeUpdate>,
    dispatch_tx: mpsc::UnboundedSender<(ProbeKey, ProbeUpdate)>,
}

/// Latency probe scheduler.
///
/// Cheap to clone; all clones share one status map, listener registry and
/// dispatcher. Built once by the composition root and handed to whoever
/// needs to issue probes.
#[derive(Clone)]
pub struct ProbeScheduler {
    inner: Arc<SchedulerInner>,
}

impl ProbeScheduler {
    /// Create a scheduler and spawn its delivery dispatcher.
    ///
    /// Must be called from within a Tokio runtime. The dispatcher exits when
    /// the last clone of the scheduler is dropped.
    pub fn new(gateway: Arc<dyn CommandGateway>) -> Self {
        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<(ProbeKey, ProbeUpdate)>();

        let inner = Arc::new(SchedulerInner {
            gateway,
            urls: DashMap::new(),
            listeners: DashMap::new(),
            statuses: DashMap::new(),
            dispatch_tx,
        });

        // The dispatcher holds only a weak handle so dropping the scheduler
        // closes the channel and ends the task.
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some((key, update)) = dispatch_rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                // Looked up at delivery time: unregistration suppresses any
                // delivery still sitting in the queue.
                let listener = inner.listeners.get(&key).map(|entry| entry.value().clone());
                drop(inner);

                if let Some(listener) = listener {
                    let delivery =
                        std::panic::catch_unwind(AssertUnwindSafe(|| listener(update)));
                    if delivery.is_err() {
                        tracing::error!(
                            group = %key.group,
                            name = %key.name,
                            delay = update.delay,
                            "probe listener panicked during delivery"
                        );
                    }
                }
            }
        });

        Self { inner }
    }

    /// Record the test URL used for all future probes issued for `group`.
    pub fn set_test_url(&self, group: &str, url: &str) {
        self.inner.urls.insert(group.to_string(), url.to_string());
    }

    /// Test URL for a group, falling back to the default endpoint.
    pub fn test_url(&self, group: &str) -> String {
        self.inner
            .urls
            .get(group)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| DEFAULT_TEST_URL.to_string())
    }

    /// Register the delivery callback for a (name, group) pair.
    ///
    /// A second registration for the same pair silently replaces the first.
    pub fn register_listener(&self, name: &str, group: &str, listener: ProbeListener) {
        self.inner
            .listeners
            .insert(ProbeKey::new(group, name), listener);
    }

    /// Remove the listener for a pair. Safe to call repeatedly and while a
    /// probe for the pair is in flight.
    pub fn unregister_listener(&self, name: &str, group: &str) {
        self.inner.listeners.remove(&ProbeKey::new(group, name));
    }

    /// Latest known delay for a pair, `UNTESTED` if never reported.
    pub fn status(&self, name: &str, group: &str) -> i64 {
        self.inner
            .statuses
            .get(&ProbeKey::new(group, name))
            .map(|entry| entry.value().delay)
            .unwrap_or(UNTESTED)
    }

    /// Latest full status observation for a pair, if any.
    pub fn last_update(&self, name: &str, group: &str) -> Option<ProbeUpdate> {
        self.inner
            .statuses
            .get(&ProbeKey::new(group, name))
            .map(|entry| *entry.value())
    }

    /// Single writer of probe status.
    ///
    /// Updates the status map synchronously and queues listener delivery for
    /// a later scheduling turn.
    fn report(&self, name: &str, group: &str, delay: i64) -> ProbeUpdate {
        let key = ProbeKey::new(group, name);
        let update = ProbeUpdate::now(delay);
        self.inner.statuses.insert(key.clone(), update);
        let _ = self.inner.dispatch_tx.send((key, update));
        update
    }

    /// Issue exactly one probe for `name` within `group`.
    ///
    /// Emits `IN_FLIGHT` immediately, then races the gateway call against a
    /// local timer. The loser keeps running but its result is discarded, so
    /// a timeout already reported can never be overwritten by a late answer.
    /// Every outcome, timeout and error included, goes through `report`.
    pub async fn probe_one(&self, name: &str, group: &str, timeout_ms: u64) -> ProbeUpdate {
        self.report(name, group, IN_FLIGHT);

        let started = Instant::now();
        let url = self.test_url(group);

        tracing::debug!(group = %group, name = %name, url = %url, timeout_ms, "probe starting");

        let gateway = self.inner.gateway.clone();
        let target = name.to_string();
        // Spawned rather than raced in place: a timeout abandons the call
        // instead of cancelling it.
        let mut call = tokio::spawn(async move {
            gateway.probe_latency(&target, &url, timeout_ms).await
        });

        let delay = tokio::select! {
            result = &mut call => match result {
                Ok(Ok(probe)) => probe.delay,
                Ok(Err(err)) => {
                    tracing::warn!(group = %group, name = %name, error = %err, "probe failed");
                    ERROR_SENTINEL
                }
                Err(err) => {
                    tracing::error!(group = %group, name = %name, error = %err, "probe task aborted");
                    ERROR_SENTINEL
                }
            },
            _ = time::sleep(Duration::from_millis(timeout_ms)) => {
                tracing::debug!(group = %group, name = %name, timeout_ms, "probe timed out");
                TIMEOUT
            }
        };

        // Keep the in-flight state visible long enough that the UI does not
        // flicker on instant answers.
        let elapsed = started.elapsed();
        if elapsed < STATUS_FLOOR {
            time::sleep(STATUS_FLOOR - elapsed).await;
        }

        metrics::record_probe_outcome(delay);
        self.report(name, group, delay)
    }

    /// Probe every name in `names`, at most `min(concurrency, names.len(), 10)`
    /// at a time.
    ///
    /// Falsy (empty) names are skipped. Every target is marked in-flight
    /// before any worker starts. A failure on one target never aborts the
    /// batch. Resolves once all workers exhaust the queue.
    pub async fn probe_many(
        &self,
        names: &[String],
        group: &str,
        timeout_ms: u64,
        concurrency: usize,
    ) {
        let names: Vec<String> = names.iter().filter(|n| !n.is_empty()).cloned().collect();
        if names.is_empty() {
            return;
        }

        for name in &names {
            self.report(name, group, IN_FLIGHT);
        }

        let workers = concurrency.min(names.len()).min(MAX_PROBE_WORKERS);
        tracing::debug!(
            group = %group,
            targets = names.len(),
            requested = concurrency,
            workers,
            "probe batch starting"
        );

        let started = Instant::now();
        let names = Arc::new(names);
        let cursor = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let scheduler = self.clone();
                let names = names.clone();
                let cursor = cursor.clone();
                let group = group.to_string();
                tokio::spawn(async move {
                    let mut first_claim = true;
                    loop {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(name) = names.get(index) else { break };

                        // Jitter every probe after this worker's first claim
                        // so the batch does not hit the backend as one burst.
                        if !first_claim {
                            let jitter = rand::thread_rng().gen_range(0..MAX_JITTER_MS);
                            time::sleep(Duration::from_millis(jitter)).await;
                        }
                        first_claim = false;

                        // probe_one folds its own failures into a sentinel,
                        // so the worker always moves on to the next name.
                        scheduler.probe_one(name, &group, timeout_ms).await;
                    }
                })
            })
            .collect();

        join_all(handles).await;

        tracing::debug!(
            group = %group,
            targets = names.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "probe batch finished"
        );
    }

    /// Probe a whole group: the per-node sweep and the backend's own batch
    /// call run concurrently against the same targets.
    ///
    /// The await resolves on the first of the two to finish; the other keeps
    /// running. Batch values are only logged; per-node reports are the sole
    /// writer of status.
    pub async fn probe_group(&self, group: &str, names: &[String], timeout_ms: u64) {
        let url = self.test_url(group);

        let gateway = self.inner.gateway.clone();
        let batch_group = group.to_string();
        let batch = tokio::spawn(async move {
            match gateway
                .probe_group_latency(&batch_group, &url, timeout_ms)
                .await
            {
                Ok(results) => {
                    tracing::debug!(group = %batch_group, results = results.len(), "backend batch probe returned");
                }
                Err(err) => {
                    tracing::warn!(group = %batch_group, error = %err, "backend batch probe failed");
                }
            }
        });

        let scheduler = self.clone();
        let sweep_group = group.to_string();
        let sweep_names = names.to_vec();
        let sweep = tokio::spawn(async move {
            scheduler
                .probe_many(&sweep_names, &sweep_group, timeout_ms, DEFAULT_PROBE_CONCURRENCY)
                .await;
        });

        tokio::select! {
            _ = sweep => {}
            _ = batch => {}
        }
    }
}
