//! Shared programmable mock backend for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time;

use proxy_live::gateway::types::{
    BackendState, BaseConfig, ProbeDelay, ProviderMap, ProxyGroup, ProxyNode, ProxyTree, RuleItem,
    SystemProxyStatus,
};
use proxy_live::gateway::{BackendEvent, CommandGateway, EventBus, GatewayError, GatewayResult};

/// Gateway whose behavior is steered per-test through atomics.
pub struct MockGateway {
    // probing
    pub probe_calls: AtomicU32,
    pub probe_latency_ms: AtomicU64,
    pub probe_fail: AtomicBool,
    pub probe_delay_value: AtomicU64,
    pub outstanding_probes: AtomicUsize,
    pub max_outstanding_probes: AtomicUsize,
    pub group_probe_calls: AtomicU32,
    pub group_probe_latency_ms: AtomicU64,

    // selection
    pub activate_calls: AtomicU32,
    pub activate_latency_ms: AtomicU64,
    pub activate_fail: AtomicBool,
    pub tray_sync_calls: AtomicU32,

    // topics
    pub proxy_tree_calls: AtomicU32,
    pub base_config_calls: AtomicU32,
    pub base_config_fail: AtomicBool,
    pub fallback_calls: AtomicU32,
    pub fallback_fail: AtomicBool,
    pub rules_calls: AtomicU32,

    // lifecycle
    pub state_calls: AtomicU32,
    pub backend_state: Mutex<BackendState>,
    pub start_calls: AtomicU32,

    pub events: broadcast::Sender<BackendEvent>,
}

impl MockGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            probe_calls: AtomicU32::new(0),
            probe_latency_ms: AtomicU64::new(0),
            probe_fail: AtomicBool::new(false),
            probe_delay_value: AtomicU64::new(42),
            outstanding_probes: AtomicUsize::new(0),
            max_outstanding_probes: AtomicUsize::new(0),
            group_probe_calls: AtomicU32::new(0),
            group_probe_latency_ms: AtomicU64::new(0),
            activate_calls: AtomicU32::new(0),
            activate_latency_ms: AtomicU64::new(0),
            activate_fail: AtomicBool::new(false),
            tray_sync_calls: AtomicU32::new(0),
            proxy_tree_calls: AtomicU32::new(0),
            base_config_calls: AtomicU32::new(0),
            base_config_fail: AtomicBool::new(false),
            fallback_calls: AtomicU32::new(0),
            fallback_fail: AtomicBool::new(false),
            rules_calls: AtomicU32::new(0),
            state_calls: AtomicU32::new(0),
            backend_state: Mutex::new(BackendState::Running),
            start_calls: AtomicU32::new(0),
            events,
        }
    }

    pub fn set_backend_state(&self, state: BackendState) {
        *self.backend_state.lock().unwrap() = state;
    }

    pub fn send_event(&self, event: BackendEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl CommandGateway for MockGateway {
    async fn probe_latency(
        &self,
        _name: &str,
        _test_url: &str,
        _timeout_ms: u64,
    ) -> GatewayResult<ProbeDelay> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.outstanding_probes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding_probes.fetch_max(now, Ordering::SeqCst);

        let latency = self.probe_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            time::sleep(Duration::from_millis(latency)).await;
        }
        self.outstanding_probes.fetch_sub(1, Ordering::SeqCst);

        if self.probe_fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("probe refused".into()));
        }
        Ok(ProbeDelay {
            delay: self.probe_delay_value.load(Ordering::SeqCst) as i64,
        })
    }

    async fn probe_group_latency(
        &self,
        _group: &str,
        _test_url: &str,
        _timeout_ms: u64,
    ) -> GatewayResult<HashMap<String, i64>> {
        self.group_probe_calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.group_probe_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            time::sleep(Duration::from_millis(latency)).await;
        }
        Ok(HashMap::new())
    }

    async fn activate_node(&self, _group: &str, _name: &str) -> GatewayResult<bool> {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.activate_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            time::sleep(Duration::from_millis(latency)).await;
        }
        if self.activate_fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                call: "activate_node",
                message: "unknown node".into(),
            });
        }
        Ok(true)
    }

    async fn sync_tray_selection(&self) -> GatewayResult<()> {
        self.tray_sync_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_proxy_tree(&self) -> GatewayResult<ProxyTree> {
        self.proxy_tree_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProxyTree {
            groups: vec![ProxyGroup {
                name: "Auto".into(),
                kind: "Selector".into(),
                all: vec!["a".into(), "b".into()],
                now: "a".into(),
            }],
            nodes: HashMap::from([(
                "a".to_string(),
                ProxyNode {
                    name: "a".into(),
                    ..Default::default()
                },
            )]),
        })
    }

    async fn get_base_config(&self) -> GatewayResult<BaseConfig> {
        self.base_config_calls.fetch_add(1, Ordering::SeqCst);
        if self.base_config_fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("backend starting".into()));
        }
        Ok(BaseConfig {
            mixed_port: 7897,
            ..Default::default()
        })
    }

    async fn get_runtime_config_fallback(&self) -> GatewayResult<BaseConfig> {
        self.fallback_calls.fetch_add(1, Ordering::SeqCst);
        if self.fallback_fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("fallback unavailable".into()));
        }
        Ok(BaseConfig {
            mixed_port: 9999,
            ..Default::default()
        })
    }

    async fn get_rules(&self) -> GatewayResult<Vec<RuleItem>> {
        self.rules_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn get_rule_providers(&self) -> GatewayResult<ProviderMap> {
        Ok(ProviderMap::new())
    }

    async fn get_proxy_providers(&self) -> GatewayResult<ProviderMap> {
        Ok(ProviderMap::new())
    }

    async fn get_system_proxy_status(&self) -> GatewayResult<SystemProxyStatus> {
        Ok(SystemProxyStatus::default())
    }

    async fn get_backend_running_state(&self) -> GatewayResult<BackendState> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.backend_state.lock().unwrap())
    }

    async fn start_backend(&self) -> GatewayResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.set_backend_state(BackendState::Running);
        Ok(())
    }
}

impl EventBus for MockGateway {
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }
}
