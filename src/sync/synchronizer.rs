//! Multi-topic state synchronization.
//!
//! # Responsibilities
//! - Keep every topic refreshed on its own cadence
//! - Re-pull targeted topics on backend-pushed events and manual requests
//! - Check backend liveness once after startup and start it if needed
//! - Expose one consistent aggregated view plus a change notification
//!
//! # Design Decisions
//! - Each topic runs its own loop; a stuck or failing topic never blocks the
//!   others
//! - Topic values live in `ArcSwapOption` cells, replaced wholesale, so a
//!   consumer can never observe a partially updated snapshot
//! - Manual refreshes bypass the dedupe window (read-after-write for the
//!   selection path); ticks and event invalidations respect it

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwapOption;
use tokio::sync::{broadcast, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::gateway::types::{
    BackendState, BaseConfig, ProviderMap, ProxyTree, RuleItem, SystemProxyStatus,
};
use crate::gateway::{BackendEvent, CommandGateway, EventBus};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::settings::VergeSettings;
use crate::sync::policy::RefreshPolicy;
use crate::sync::snapshot::{system_proxy_address, BackendStatus, LiveSnapshot};
use crate::sync::topic::{fetch_chain, Supplier, TopicKey};

/// Time given to the backend to finish initializing before the liveness
/// check runs.
const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// A request to re-pull one topic.
#[derive(Debug, Clone, Copy)]
struct RefreshRequest {
    topic: TopicKey,
    /// Forced requests skip the dedupe window.
    forced: bool,
}

/// Cheap handle for requesting topic refreshes from elsewhere.
#[derive(Clone)]
pub struct SyncHandle {
    tx: broadcast::Sender<RefreshRequest>,
}

impl SyncHandle {
    /// Ask for a refresh; collapsed if the topic was fetched recently.
    pub fn refresh(&self, topic: TopicKey) {
        let _ = self.tx.send(RefreshRequest { topic, forced: false });
    }

    /// Ask for a refresh that bypasses the dedupe window.
    pub fn force_refresh(&self, topic: TopicKey) {
        let _ = self.tx.send(RefreshRequest { topic, forced: true });
    }
}

struct SyncInner {
    gateway: Arc<dyn CommandGateway>,
    settings: ArcSwapOption<VergeSettings>,
    proxies: Arc<ArcSwapOption<ProxyTree>>,
    base_config: Arc<ArcSwapOption<BaseConfig>>,
    rules: Arc<ArcSwapOption<Vec<RuleItem>>>,
    rule_providers: Arc<ArcSwapOption<ProviderMap>>,
    proxy_providers: Arc<ArcSwapOption<ProviderMap>>,
    system_proxy: Arc<ArcSwapOption<SystemProxyStatus>>,
    backend: Arc<ArcSwapOption<BackendStatus>>,
    revision: watch::Sender<u64>,
    refresh_tx: broadcast::Sender<RefreshRequest>,
}

impl SyncInner {
    fn bump_revision(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

/// Owns the topic set and its refresh loops.
#[derive(Clone)]
pub struct StateSynchronizer {
    inner: Arc<SyncInner>,
}

impl StateSynchronizer {
    pub fn new(gateway: Arc<dyn CommandGateway>) -> Self {
        let (revision, _) = watch::channel(0);
        let (refresh_tx, _) = broadcast::channel(64);

        Self {
            inner: Arc::new(SyncInner {
                gateway,
                settings: ArcSwapOption::empty(),
                proxies: Arc::new(ArcSwapOption::empty()),
                base_config: Arc::new(ArcSwapOption::empty()),
                rules: Arc::new(ArcSwapOption::empty()),
                rule_providers: Arc::new(ArcSwapOption::empty()),
                proxy_providers: Arc::new(ArcSwapOption::empty()),
                system_proxy: Arc::new(ArcSwapOption::empty()),
                backend: Arc::new(ArcSwapOption::empty()),
                revision,
                refresh_tx,
            }),
        }
    }

    /// Handle for requesting refreshes without holding the synchronizer.
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            tx: self.inner.refresh_tx.clone(),
        }
    }

    /// Receiver that changes whenever any topic snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Replace the local application settings feeding the derived values.
    pub fn update_settings(&self, settings: VergeSettings) {
        self.inner.settings.store(Some(Arc::new(settings)));
        self.inner.bump_revision();
    }

    pub fn settings(&self) -> Option<Arc<VergeSettings>> {
        self.inner.settings.load_full()
    }

    /// Assemble the aggregated view from the current topic cells.
    pub fn snapshot(&self) -> LiveSnapshot {
        let settings = self.inner.settings.load_full();
        let base_config = self.inner.base_config.load_full();
        let system_proxy = self.inner.system_proxy.load_full();

        LiveSnapshot {
            system_proxy_address: system_proxy_address(
                settings.as_deref(),
                base_config.as_deref(),
                system_proxy.as_deref(),
            ),
            proxies: self.inner.proxies.load_full(),
            base_config,
            rules: self.inner.rules.load_full(),
            rule_providers: self.inner.rule_providers.load_full(),
            proxy_providers: self.inner.proxy_providers.load_full(),
            system_proxy,
            backend: self.inner.backend.load_full(),
            revision: *self.inner.revision.borrow(),
        }
    }

    /// Spawn every topic loop, the event bridge and the startup check.
    ///
    /// If teardown was already requested before this ran, nothing is
    /// registered and no handle leaks.
    pub fn run(&self, events: &dyn EventBus, shutdown: &Shutdown) {
        if shutdown.is_triggered() {
            tracing::debug!("synchronizer start skipped, teardown already requested");
            return;
        }

        self.spawn_topic_loops(shutdown);
        self.spawn_event_bridge(events.subscribe(), shutdown);
        self.spawn_startup_check(shutdown.subscribe());
    }

    fn spawn_topic_loops(&self, shutdown: &Shutdown) {
        let inner = &self.inner;

        let gw = inner.gateway.clone();
        spawn_topic(
            inner.clone(),
            TopicKey::Proxies,
            RefreshPolicy::fast(),
            vec![supplier(move |g| async move { g.get_proxy_tree().await }, gw)],
            None,
            inner.proxies.clone(),
            shutdown.subscribe(),
        );

        // Base config converges through a layered chain: primary call,
        // runtime fallback, and finally a hard-coded default so dependents
        // always see some well-formed value during cold start.
        let gw = inner.gateway.clone();
        let gw2 = inner.gateway.clone();
        spawn_topic(
            inner.clone(),
            TopicKey::BaseConfig,
            RefreshPolicy::slow_poll(),
            vec![
                supplier(move |g| async move { g.get_base_config().await }, gw),
                supplier(
                    move |g| async move { g.get_runtime_config_fallback().await },
                    gw2,
                ),
            ],
            Some(BaseConfig::default()),
            inner.base_config.clone(),
            shutdown.subscribe(),
        );

        let gw = inner.gateway.clone();
        spawn_topic(
            inner.clone(),
            TopicKey::Rules,
            RefreshPolicy::fast(),
            vec![supplier(move |g| async move { g.get_rules().await }, gw)],
            None,
            inner.rules.clone(),
            shutdown.subscribe(),
        );

        let gw = inner.gateway.clone();
        spawn_topic(
            inner.clone(),
            TopicKey::RuleProviders,
            RefreshPolicy::fast(),
            vec![supplier(move |g| async move { g.get_rule_providers().await }, gw)],
            None,
            inner.rule_providers.clone(),
            shutdown.subscribe(),
        );

        let gw = inner.gateway.clone();
        spawn_topic(
            inner.clone(),
            TopicKey::ProxyProviders,
            RefreshPolicy::fast(),
            vec![supplier(move |g| async move { g.get_proxy_providers().await }, gw)],
            None,
            inner.proxy_providers.clone(),
            shutdown.subscribe(),
        );

        let gw = inner.gateway.clone();
        spawn_topic(
            inner.clone(),
            TopicKey::SystemProxy,
            RefreshPolicy::fast(),
            vec![supplier(
                move |g| async move { g.get_system_proxy_status().await },
                gw,
            )],
            None,
            inner.system_proxy.clone(),
            shutdown.subscribe(),
        );

        // Uptime topic: running state plus the instant the current state was
        // first observed, carried over while the state is unchanged.
        let gw = inner.gateway.clone();
        let backend_cell = inner.backend.clone();
        let backend_supplier: Supplier<BackendStatus> = Box::new(move || {
            let gateway = gw.clone();
            let cell = backend_cell.clone();
            Box::pin(async move {
                let state = gateway.get_backend_running_state().await?;
                let since = match cell.load_full() {
                    Some(previous) if previous.state == state => previous.since,
                    _ => SystemTime::now(),
                };
                Ok(BackendStatus { state, since })
            })
        });
        spawn_topic(
            inner.clone(),
            TopicKey::BackendStatus,
            RefreshPolicy::slow_poll(),
            vec![backend_supplier],
            None,
            inner.backend.clone(),
            shutdown.subscribe(),
        );
    }

    /// Translate backend-pushed events into targeted topic refreshes.
    fn spawn_event_bridge(&self, mut events: broadcast::Receiver<BackendEvent>, shutdown: &Shutdown) {
        let handle = self.handle();
        let mut shutdown_rx = shutdown.subscribe();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            // The subscription may complete after teardown was requested;
            // drop it right away instead of entering the loop.
            if shutdown.is_triggered() {
                return;
            }

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            tracing::debug!(?event, "backend event received, invalidating topics");
                            for topic in invalidated_topics(event) {
                                handle.refresh(*topic);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("event bridge stopped");
        });
    }

    /// One-shot liveness check after the startup grace delay.
    fn spawn_startup_check(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let gateway = self.inner.gateway.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(STARTUP_GRACE) => {}
                _ = shutdown_rx.recv() => return,
            }

            match gateway.get_backend_running_state().await {
                Ok(BackendState::Running) => {
                    tracing::debug!("backend already running");
                }
                Ok(BackendState::NotRunning) => {
                    tracing::info!("backend not running after startup grace, issuing start");
                    if let Err(err) = gateway.start_backend().await {
                        // Best-effort only; a failed start is the backend
                        // supervisor's problem, not ours.
                        tracing::warn!(error = %err, "backend start failed");
                    }
                }
                Ok(state) => {
                    tracing::warn!(?state, "backend state inconclusive, not starting");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "backend state check failed");
                }
            }
        });
    }
}

/// Which topics a backend event invalidates.
fn invalidated_topics(event: BackendEvent) -> &'static [TopicKey] {
    match event {
        BackendEvent::ConfigChanged => &[
            TopicKey::BaseConfig,
            TopicKey::Rules,
            TopicKey::RuleProviders,
        ],
        BackendEvent::ProxyConfigChanged => &[TopicKey::Proxies, TopicKey::ProxyProviders],
    }
}

/// Build a single-call supplier from a gateway method.
fn supplier<T, F, Fut>(call: F, gateway: Arc<dyn CommandGateway>) -> Supplier<T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn CommandGateway>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T, crate::gateway::GatewayError>> + Send + 'static,
{
    Box::new(move || Box::pin(call(gateway.clone())))
}

/// Spawn the refresh loop for one topic.
fn spawn_topic<T: Send + Sync + 'static>(
    inner: Arc<SyncInner>,
    key: TopicKey,
    policy: RefreshPolicy,
    suppliers: Vec<Supplier<T>>,
    mut default: Option<T>,
    cell: Arc<ArcSwapOption<T>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut refresh_rx = inner.refresh_tx.subscribe();

    tokio::spawn(async move {
        let mut ticker = time::interval(policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_fetch: Option<Instant> = None;

        loop {
            let forced = tokio::select! {
                _ = ticker.tick() => false,
                request = refresh_rx.recv() => match request {
                    Ok(request) if request.topic == key => request.forced,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => break,
            };

            if !forced {
                if let Some(at) = last_fetch {
                    if at.elapsed() < policy.dedupe {
                        continue;
                    }
                }
            }
            last_fetch = Some(Instant::now());

            match fetch_chain(key.as_str(), &suppliers, &policy).await {
                Some(value) => {
                    cell.store(Some(Arc::new(value)));
                    inner.bump_revision();
                    metrics::record_topic_refresh(key.as_str(), true);
                }
                None => {
                    metrics::record_topic_refresh(key.as_str(), false);
                    // Serve last-known-good; install the hard-coded default
                    // only if there has never been a good value.
                    if cell.load().is_none() {
                        if let Some(value) = default.take() {
                            tracing::warn!(topic = key.as_str(), "installing default snapshot");
                            cell.store(Some(Arc::new(value)));
                            inner.bump_revision();
                        }
                    }
                }
            }
        }

        tracing::debug!(topic = key.as_str(), "topic loop stopped");
    });
}
