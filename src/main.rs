//! Demo runner wiring the live-state core against a simulated backend.
//!
//! Useful for watching the subsystem behave end to end without a real proxy
//! engine: startup check-and-start, topic convergence, a probe sweep and a
//! node switch, all logged.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proxy_live::gateway::types::{
    BackendState, BaseConfig, ProbeDelay, ProviderMap, ProxyGroup, ProxyNode, ProxyTree, RuleItem,
    SystemProxyStatus,
};
use proxy_live::gateway::{BackendEvent, CommandGateway, EventBus, GatewayResult};
use proxy_live::settings::{load_settings, VergeSettings};
use proxy_live::{ProbeScheduler, SelectionCoordinator, Shutdown, StateSynchronizer};

#[derive(Parser, Debug)]
#[command(name = "proxy-live", about = "Live-state engine demo against a simulated backend")]
struct Args {
    /// Path to a TOML settings file.
    #[arg(long)]
    settings: Option<PathBuf>,
}

/// In-process stand-in for the backend, answering every gateway call with
/// plausible data and randomized latencies.
struct SimulatedGateway {
    running: AtomicBool,
    active: tokio::sync::Mutex<String>,
    events: broadcast::Sender<BackendEvent>,
}

impl SimulatedGateway {
    fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            running: AtomicBool::new(false),
            active: tokio::sync::Mutex::new("tokyo-1".to_string()),
            events,
        }
    }

    async fn network_pause() {
        let pause = rand::thread_rng().gen_range(20..120);
        time::sleep(Duration::from_millis(pause)).await;
    }
}

#[async_trait]
impl CommandGateway for SimulatedGateway {
    async fn probe_latency(
        &self,
        _name: &str,
        _test_url: &str,
        _timeout_ms: u64,
    ) -> GatewayResult<ProbeDelay> {
        let delay = rand::thread_rng().gen_range(30..600);
        time::sleep(Duration::from_millis(delay as u64)).await;
        Ok(ProbeDelay { delay })
    }

    async fn probe_group_latency(
        &self,
        _group: &str,
        _test_url: &str,
        _timeout_ms: u64,
    ) -> GatewayResult<HashMap<String, i64>> {
        Self::network_pause().await;
        Ok(HashMap::new())
    }

    async fn activate_node(&self, group: &str, name: &str) -> GatewayResult<bool> {
        Self::network_pause().await;
        *self.active.lock().await = name.to_string();
        tracing::info!(group = %group, name = %name, "simulated backend switched node");
        let _ = self.events.send(BackendEvent::ProxyConfigChanged);
        Ok(true)
    }

    async fn sync_tray_selection(&self) -> GatewayResult<()> {
        Ok(())
    }

    async fn get_proxy_tree(&self) -> GatewayResult<ProxyTree> {
        Self::network_pause().await;
        let names = ["tokyo-1", "tokyo-2", "frankfurt-1"];
        Ok(ProxyTree {
            groups: vec![ProxyGroup {
                name: "Auto".into(),
                kind: "Selector".into(),
                all: names.iter().map(|n| n.to_string()).collect(),
                now: self.active.lock().await.clone(),
            }],
            nodes: names
                .iter()
                .map(|n| {
                    (
                        n.to_string(),
                        ProxyNode {
                            name: n.to_string(),
                            kind: "Shadowsocks".into(),
                            history: Vec::new(),
                        },
                    )
                })
                .collect(),
        })
    }

    async fn get_base_config(&self) -> GatewayResult<BaseConfig> {
        Self::network_pause().await;
        Ok(BaseConfig::default())
    }

    async fn get_runtime_config_fallback(&self) -> GatewayResult<BaseConfig> {
        Ok(BaseConfig::default())
    }

    async fn get_rules(&self) -> GatewayResult<Vec<RuleItem>> {
        Ok(vec![RuleItem {
            kind: "MATCH".into(),
            payload: String::new(),
            proxy: "Auto".into(),
        }])
    }

    async fn get_rule_providers(&self) -> GatewayResult<ProviderMap> {
        Ok(ProviderMap::new())
    }

    async fn get_proxy_providers(&self) -> GatewayResult<ProviderMap> {
        Ok(ProviderMap::new())
    }

    async fn get_system_proxy_status(&self) -> GatewayResult<SystemProxyStatus> {
        Ok(SystemProxyStatus {
            enabled: true,
            server: String::new(),
            bypass: String::new(),
        })
    }

    async fn get_backend_running_state(&self) -> GatewayResult<BackendState> {
        Ok(if self.running.load(Ordering::Acquire) {
            BackendState::Running
        } else {
            BackendState::NotRunning
        })
    }

    async fn start_backend(&self) -> GatewayResult<()> {
        self.running.store(true, Ordering::Release);
        tracing::info!("simulated backend started");
        Ok(())
    }
}

impl EventBus for SimulatedGateway {
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proxy_live=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => VergeSettings::default(),
    };
    let timeout_ms = settings.default_latency_timeout;
    let test_url = settings.latency_test_url.clone();

    tracing::info!("proxy-live demo starting");

    let gateway = Arc::new(SimulatedGateway::new());
    let shutdown = Shutdown::new();

    let synchronizer = StateSynchronizer::new(gateway.clone());
    synchronizer.update_settings(settings);
    synchronizer.run(gateway.as_ref(), &shutdown);

    let scheduler = ProbeScheduler::new(gateway.clone());
    if let Some(url) = &test_url {
        scheduler.set_test_url("Auto", url);
    }
    let coordinator = SelectionCoordinator::new(gateway.clone(), synchronizer.handle());

    scheduler.register_listener(
        "tokyo-1",
        "Auto",
        Arc::new(|update| {
            tracing::info!(delay = update.delay, "tokyo-1 status update");
        }),
    );

    // Let the startup check and initial topic fetches settle.
    time::sleep(Duration::from_secs(3)).await;

    let snapshot = synchronizer.snapshot();
    tracing::info!(
        revision = snapshot.revision,
        address = %snapshot.system_proxy_address,
        groups = snapshot.proxies.as_ref().map(|p| p.groups.len()).unwrap_or(0),
        "initial snapshot"
    );

    if let Some(tree) = &snapshot.proxies {
        if let Some(group) = tree.group("Auto") {
            scheduler.probe_group(&group.name, &group.all, timeout_ms).await;
            for name in &group.all {
                tracing::info!(
                    name = %name,
                    status = %proxy_live::probe::format_delay(
                        scheduler.status(name, &group.name),
                        timeout_ms as i64,
                    ),
                    "probe result"
                );
            }
        }
    }

    let outcome = coordinator.select("Auto", "tokyo-2").await?;
    tracing::info!(?outcome, "node switch requested");

    time::sleep(Duration::from_secs(1)).await;
    let snapshot = synchronizer.snapshot();
    tracing::info!(
        revision = snapshot.revision,
        now = %snapshot
            .proxies
            .as_ref()
            .and_then(|p| p.group("Auto"))
            .map(|g| g.now.clone())
            .unwrap_or_default(),
        "final snapshot"
    );

    shutdown.trigger();
    Ok(())
}
