//! The aggregated read model.

use std::sync::Arc;
use std::time::SystemTime;

use crate::gateway::types::{
    BackendState, BaseConfig, ProviderMap, ProxyTree, RuleItem, SystemProxyStatus,
};
use crate::settings::{VergeSettings, DEFAULT_MIXED_PORT, DEFAULT_PROXY_HOST};

/// Backend process state plus when that state was first observed.
#[derive(Debug, Clone, Copy)]
pub struct BackendStatus {
    pub state: BackendState,
    /// Start of the current uninterrupted run of this state.
    pub since: SystemTime,
}

/// One consistent view over every topic, assembled at read time.
///
/// Each constituent is an immutable snapshot replaced wholesale by its topic
/// loop; a field is `None` until its topic has been fetched at least once.
#[derive(Clone)]
pub struct LiveSnapshot {
    pub proxies: Option<Arc<ProxyTree>>,
    pub base_config: Option<Arc<BaseConfig>>,
    pub rules: Option<Arc<Vec<RuleItem>>>,
    pub rule_providers: Option<Arc<ProviderMap>>,
    pub proxy_providers: Option<Arc<ProviderMap>>,
    pub system_proxy: Option<Arc<SystemProxyStatus>>,
    pub backend: Option<Arc<BackendStatus>>,
    /// Derived address of the local proxy endpoint, `"-"` when unknown.
    pub system_proxy_address: String,
    /// Monotonic revision; bumps whenever any constituent changes.
    pub revision: u64,
}

/// Derive the system proxy address from settings and fetched state.
///
/// With the manual-PAC flag set, the address is always host:port from
/// settings. Otherwise the OS-reported server wins unless it is empty or a
/// bare `:port` string, in which case the same host:port construction is
/// used. Missing settings yield `"-"`. Never panics.
pub fn system_proxy_address(
    settings: Option<&VergeSettings>,
    base_config: Option<&BaseConfig>,
    system_proxy: Option<&SystemProxyStatus>,
) -> String {
    let Some(settings) = settings else {
        return "-".to_string();
    };

    let host = settings.proxy_host.as_deref().unwrap_or(DEFAULT_PROXY_HOST);
    let port = settings
        .verge_mixed_port
        .or(base_config.map(|c| c.mixed_port))
        .unwrap_or(DEFAULT_MIXED_PORT);
    let manual = format!("{host}:{port}");

    if settings.proxy_auto_config {
        return manual;
    }

    match system_proxy.map(|s| s.server.trim()) {
        Some(server) if !server.is_empty() && !server.starts_with(':') => server.to_string(),
        _ => manual,
    }
}
