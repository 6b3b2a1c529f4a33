//! Data model for backend-derived state.
//!
//! Everything here is fetched from the backend and replaced wholesale on
//! refresh; nothing in this module is mutated in place by consumers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Result of a single latency probe, as returned by the backend.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ProbeDelay {
    /// Round-trip latency in milliseconds.
    pub delay: i64,
}

/// One historical latency sample kept on a node.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DelaySample {
    /// Seconds since epoch when the sample was taken.
    pub at: u64,
    /// Measured latency in milliseconds.
    pub delay: i64,
}

/// A single proxy node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyNode {
    /// Node name, unique within its group.
    pub name: String,
    /// Free-form transport tag (e.g. "Shadowsocks", "Vmess", "Direct").
    pub kind: String,
    /// Recent latency samples, newest last. Bounded by the backend.
    pub history: Vec<DelaySample>,
}

impl Default for ProxyNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "Unknown".to_string(),
            history: Vec::new(),
        }
    }
}

/// A named group of interchangeable proxy nodes with one active member.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyGroup {
    /// Group name, unique across the tree.
    pub name: String,
    /// Group strategy tag (e.g. "Selector", "URLTest").
    pub kind: String,
    /// Ordered member node names.
    pub all: Vec<String>,
    /// Name of the currently active member.
    pub now: String,
}

/// The full proxy topology as reported by the backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyTree {
    /// All groups, in backend order.
    pub groups: Vec<ProxyGroup>,
    /// Flat node index keyed by node name.
    pub nodes: HashMap<String, ProxyNode>,
}

impl ProxyTree {
    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&ProxyGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&ProxyNode> {
        self.nodes.get(name)
    }
}

/// Core backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Routing mode (e.g. "rule", "global", "direct").
    pub mode: String,
    /// Plain HTTP proxy port.
    pub port: u16,
    /// Mixed HTTP/SOCKS port.
    pub mixed_port: u16,
    /// SOCKS5 proxy port.
    pub socks_port: u16,
    /// Backend log level.
    pub log_level: String,
    /// Whether the backend allows LAN connections.
    pub allow_lan: bool,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            mode: "rule".to_string(),
            port: 7890,
            mixed_port: 7897,
            socks_port: 7891,
            log_level: "info".to_string(),
            allow_lan: false,
        }
    }
}

/// A single routing rule.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleItem {
    /// Rule kind (e.g. "DOMAIN-SUFFIX", "GEOIP", "MATCH").
    #[serde(rename = "type")]
    pub kind: String,
    /// Match payload.
    pub payload: String,
    /// Target proxy or group name.
    pub proxy: String,
}

/// Metadata about one rule or proxy provider.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderInfo {
    pub name: String,
    /// Delivery vehicle (e.g. "HTTP", "File", "Inline").
    pub vehicle: String,
    /// Number of entries the provider currently holds.
    pub count: usize,
    /// Last update timestamp as reported by the backend, if any.
    pub updated_at: Option<String>,
}

/// Providers keyed by name.
pub type ProviderMap = HashMap<String, ProviderInfo>;

/// OS-level system proxy status.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemProxyStatus {
    pub enabled: bool,
    /// OS-reported proxy address, possibly empty or a bare ":port".
    pub server: String,
    pub bypass: String,
}

/// Running state of the backend process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BackendState {
    Running,
    NotRunning,
    Unknown,
}
