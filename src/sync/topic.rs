//! Topic identities and the fallback-chain fetch.
//!
//! A topic is one independently refreshed unit of backend state. Each topic
//! has an ordered chain of suppliers; a fetch walks the chain and
//! short-circuits on the first success, retrying the whole chain per policy.

use futures_util::future::BoxFuture;
use tokio::time;

use crate::gateway::GatewayError;
use crate::sync::policy::RefreshPolicy;

/// Names of the topics the synchronizer maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKey {
    Proxies,
    BaseConfig,
    Rules,
    RuleProviders,
    ProxyProviders,
    SystemProxy,
    BackendStatus,
}

impl TopicKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKey::Proxies => "proxies",
            TopicKey::BaseConfig => "base_config",
            TopicKey::Rules => "rules",
            TopicKey::RuleProviders => "rule_providers",
            TopicKey::ProxyProviders => "proxy_providers",
            TopicKey::SystemProxy => "system_proxy",
            TopicKey::BackendStatus => "backend_status",
        }
    }
}

/// One source of a topic's value.
pub type Supplier<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, GatewayError>> + Send + Sync>;

/// Walk the supplier chain until one succeeds.
///
/// Each attempt is capped by the policy's per-attempt timeout. After the
/// whole chain fails, the round is retried up to `max_retries` more times
/// with `retry_delay` between rounds. Returns `None` only when every
/// supplier in every round failed; the caller decides what to serve instead.
pub async fn fetch_chain<T>(
    topic: &'static str,
    suppliers: &[Supplier<T>],
    policy: &RefreshPolicy,
) -> Option<T> {
    for round in 0..=policy.max_retries {
        if round > 0 {
            time::sleep(policy.retry_delay).await;
        }

        for (source, supplier) in suppliers.iter().enumerate() {
            match time::timeout(policy.attempt_timeout, supplier()).await {
                Ok(Ok(value)) => {
                    if source > 0 || round > 0 {
                        tracing::debug!(topic, source, round, "topic fetched via fallback");
                    }
                    return Some(value);
                }
                Ok(Err(err)) => {
                    tracing::warn!(topic, source, round, error = %err, "topic fetch failed");
                }
                Err(_) => {
                    tracing::warn!(topic, source, round, "topic fetch timed out");
                }
            }
        }
    }

    tracing::warn!(topic, retries = policy.max_retries, "all topic sources exhausted");
    None
}
