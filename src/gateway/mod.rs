//! Interfaces to the external backend process.
//!
//! # Responsibilities
//! - Define the command surface the live-state core calls (`CommandGateway`)
//! - Define the push-notification surface it listens to (`EventBus`)
//! - Define the data model those calls exchange
//!
//! # Design Decisions
//! - Both seams are traits so tests and the demo binary can substitute
//!   in-process fakes; the real transport (IPC, HTTP) lives outside this crate
//! - All calls are fallible and asynchronous; no call here is ever fatal to
//!   the process

pub mod types;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

pub use types::{
    BackendState, BaseConfig, DelaySample, ProbeDelay, ProviderInfo, ProviderMap, ProxyGroup,
    ProxyNode, ProxyTree, RuleItem, SystemProxyStatus,
};

/// Errors surfaced by backend calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The call never reached the backend or the connection dropped.
    #[error("backend transport error: {0}")]
    Transport(String),

    /// The backend received the call and refused it.
    #[error("backend rejected {call}: {message}")]
    Rejected {
        call: &'static str,
        message: String,
    },

    /// The backend answered with something we could not decode.
    #[error("backend response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request/response surface of the backend.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to call
/// from overlapping tasks.
#[async_trait]
pub trait CommandGateway: Send + Sync {
    /// Measure latency for one node against a test URL.
    async fn probe_latency(
        &self,
        name: &str,
        test_url: &str,
        timeout_ms: u64,
    ) -> GatewayResult<ProbeDelay>;

    /// Ask the backend to probe a whole group in one call.
    async fn probe_group_latency(
        &self,
        group: &str,
        test_url: &str,
        timeout_ms: u64,
    ) -> GatewayResult<HashMap<String, i64>>;

    /// Make `name` the active member of `group`.
    async fn activate_node(&self, group: &str, name: &str) -> GatewayResult<bool>;

    /// Push the current selection into the tray/status surface.
    async fn sync_tray_selection(&self) -> GatewayResult<()>;

    async fn get_proxy_tree(&self) -> GatewayResult<ProxyTree>;

    async fn get_base_config(&self) -> GatewayResult<BaseConfig>;

    /// Alternate source for the base config, used only when the primary fails.
    async fn get_runtime_config_fallback(&self) -> GatewayResult<BaseConfig>;

    async fn get_rules(&self) -> GatewayResult<Vec<RuleItem>>;

    async fn get_rule_providers(&self) -> GatewayResult<ProviderMap>;

    async fn get_proxy_providers(&self) -> GatewayResult<ProviderMap>;

    async fn get_system_proxy_status(&self) -> GatewayResult<SystemProxyStatus>;

    async fn get_backend_running_state(&self) -> GatewayResult<BackendState>;

    async fn start_backend(&self) -> GatewayResult<()>;
}

/// A zero-payload push notification from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// The backend's configuration changed.
    ConfigChanged,
    /// The proxy topology or selection changed.
    ProxyConfigChanged,
}

/// Backend-to-frontend push surface.
pub trait EventBus: Send + Sync {
    /// Subscribe to backend events. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}
