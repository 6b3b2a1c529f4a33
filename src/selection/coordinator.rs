//! Mutually exclusive node switching.
//!
//! # Responsibilities
//! - Change the active node within a group, at most one switch in flight
//! - Trigger the downstream proxy-topic refresh on success
//!
//! # Design Decisions
//! - Calls arriving while a switch is pending are dropped, not queued; the
//!   user clicking twice wants one switch, not two
//! - The pending flag is cleared by an RAII guard so no exit path can leak it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::gateway::{CommandGateway, GatewayError};
use crate::observability::metrics;
use crate::sync::{SyncHandle, TopicKey};

/// What happened to one `select` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The backend accepted the switch.
    Applied,
    /// Another switch was already in flight; this request was discarded.
    Dropped,
}

/// Serializes "activate node in group" operations.
pub struct SelectionCoordinator {
    gateway: Arc<dyn CommandGateway>,
    sync: SyncHandle,
    pending: Arc<AtomicBool>,
}

/// Clears the pending flag when the operation leaves scope, whatever the
/// outcome.
struct PendingGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SelectionCoordinator {
    pub fn new(gateway: Arc<dyn CommandGateway>, sync: SyncHandle) -> Self {
        Self {
            gateway,
            sync,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a switch is currently in flight.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Make `name` the active member of `group`.
    ///
    /// Returns `Dropped` without calling the backend if a switch is already
    /// pending. On success the tray sync runs best-effort and the proxies
    /// topic is force-refreshed; the aggregated view catches up only once
    /// that refresh completes. Backend failures propagate to the caller with
    /// the pending flag already cleared.
    pub async fn select(&self, group: &str, name: &str) -> Result<SelectOutcome, GatewayError> {
        if self.pending.swap(true, Ordering::AcqRel) {
            tracing::debug!(group = %group, name = %name, "node switch already in flight, dropping");
            metrics::record_selection_dropped();
            return Ok(SelectOutcome::Dropped);
        }
        let _guard = PendingGuard {
            flag: self.pending.clone(),
        };

        self.gateway.activate_node(group, name).await?;

        // Best-effort: a failed tray sync never rolls the switch back.
        if let Err(err) = self.gateway.sync_tray_selection().await {
            tracing::warn!(error = %err, "tray selection sync failed after node switch");
        }

        self.sync.force_refresh(TopicKey::Proxies);

        tracing::info!(group = %group, name = %name, "active node switched");
        Ok(SelectOutcome::Applied)
    }
}
