//! State synchronizer and selection coordinator behavior tests.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use proxy_live::gateway::types::BackendState;
use proxy_live::gateway::BackendEvent;
use proxy_live::{
    SelectOutcome, SelectionCoordinator, Shutdown, StateSynchronizer, TopicKey, VergeSettings,
};

mod common;
use common::MockGateway;

fn started_synchronizer(gateway: &Arc<MockGateway>) -> (StateSynchronizer, Shutdown) {
    let synchronizer = StateSynchronizer::new(gateway.clone());
    let shutdown = Shutdown::new();
    synchronizer.run(gateway.as_ref(), &shutdown);
    (synchronizer, shutdown)
}

#[tokio::test(start_paused = true)]
async fn test_initial_topics_converge() {
    let gateway = Arc::new(MockGateway::new());
    let (synchronizer, _shutdown) = started_synchronizer(&gateway);

    time::sleep(Duration::from_secs(1)).await;

    let snapshot = synchronizer.snapshot();
    assert!(snapshot.proxies.is_some());
    assert!(snapshot.base_config.is_some());
    assert!(snapshot.revision > 0);
    // No settings loaded yet: the derived address is the placeholder.
    assert_eq!(snapshot.system_proxy_address, "-");

    synchronizer.update_settings(VergeSettings::default());
    let snapshot = synchronizer.snapshot();
    assert_eq!(snapshot.system_proxy_address, "127.0.0.1:7897");
}

#[tokio::test(start_paused = true)]
async fn test_fallback_value_served_when_primary_fails() {
    let gateway = Arc::new(MockGateway::new());
    gateway.base_config_fail.store(true, Ordering::SeqCst);
    let (synchronizer, _shutdown) = started_synchronizer(&gateway);

    time::sleep(Duration::from_secs(1)).await;

    let config = synchronizer.snapshot().base_config.expect("no base config");
    // The whole fallback value, never a mix of primary and fallback fields.
    assert_eq!(config.mixed_port, 9999);
    assert!(gateway.base_config_calls.load(Ordering::SeqCst) >= 1);
    assert!(gateway.fallback_calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_installed_when_every_source_fails() {
    let gateway = Arc::new(MockGateway::new());
    gateway.base_config_fail.store(true, Ordering::SeqCst);
    gateway.fallback_fail.store(true, Ordering::SeqCst);
    let (synchronizer, _shutdown) = started_synchronizer(&gateway);

    // Slow-poll profile: up to 5 retry rounds, 1 s apart.
    time::sleep(Duration::from_secs(10)).await;

    let config = synchronizer.snapshot().base_config.expect("no base config");
    assert_eq!(config.mixed_port, 7897);
    assert_eq!(config.mode, "rule");
}

#[tokio::test(start_paused = true)]
async fn test_recovered_primary_replaces_fallback_value() {
    let gateway = Arc::new(MockGateway::new());
    gateway.base_config_fail.store(true, Ordering::SeqCst);
    let (synchronizer, _shutdown) = started_synchronizer(&gateway);

    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(synchronizer.snapshot().base_config.unwrap().mixed_port, 9999);

    gateway.base_config_fail.store(false, Ordering::SeqCst);
    // Next slow-poll tick re-pulls the primary.
    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(synchronizer.snapshot().base_config.unwrap().mixed_port, 7897);
}

#[tokio::test(start_paused = true)]
async fn test_startup_starts_backend_exactly_once() {
    let gateway = Arc::new(MockGateway::new());
    gateway.set_backend_state(BackendState::NotRunning);
    let (_synchronizer, _shutdown) = started_synchronizer(&gateway);

    // Before the 2 s grace delay nothing is started.
    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(gateway.start_calls.load(Ordering::SeqCst), 0);

    time::sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.start_calls.load(Ordering::SeqCst), 1);

    // The check is one-shot; later polls never re-trigger it.
    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(gateway.start_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_running_backend_is_not_started() {
    let gateway = Arc::new(MockGateway::new());
    let (_synchronizer, _shutdown) = started_synchronizer(&gateway);

    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.start_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_event_invalidates_only_mapped_topics() {
    let gateway = Arc::new(MockGateway::new());
    let (_synchronizer, _shutdown) = started_synchronizer(&gateway);

    // Move past the proxies dedupe window but stay before the next tick.
    time::sleep(Duration::from_secs(4)).await;
    let proxies_before = gateway.proxy_tree_calls.load(Ordering::SeqCst);
    let rules_before = gateway.rules_calls.load(Ordering::SeqCst);

    gateway.send_event(BackendEvent::ProxyConfigChanged);
    time::sleep(Duration::from_millis(500)).await;

    assert_eq!(
        gateway.proxy_tree_calls.load(Ordering::SeqCst),
        proxies_before + 1,
        "proxy config event must re-pull the proxy tree"
    );
    assert_eq!(
        gateway.rules_calls.load(Ordering::SeqCst),
        rules_before,
        "proxy config event must not touch the rules topic"
    );
}

#[tokio::test(start_paused = true)]
async fn test_force_refresh_bypasses_dedupe_window() {
    let gateway = Arc::new(MockGateway::new());
    let (synchronizer, _shutdown) = started_synchronizer(&gateway);
    let handle = synchronizer.handle();

    time::sleep(Duration::from_millis(200)).await;
    let before = gateway.proxy_tree_calls.load(Ordering::SeqCst);

    // Inside the dedupe window a plain refresh is collapsed…
    handle.refresh(TopicKey::Proxies);
    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.proxy_tree_calls.load(Ordering::SeqCst), before);

    // …while a forced one goes through.
    handle.force_refresh(TopicKey::Proxies);
    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.proxy_tree_calls.load(Ordering::SeqCst), before + 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_topic_loops() {
    let gateway = Arc::new(MockGateway::new());
    let (_synchronizer, shutdown) = started_synchronizer(&gateway);

    time::sleep(Duration::from_secs(1)).await;
    shutdown.trigger();
    time::sleep(Duration::from_millis(100)).await;

    let after_shutdown = gateway.proxy_tree_calls.load(Ordering::SeqCst);
    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(
        gateway.proxy_tree_calls.load(Ordering::SeqCst),
        after_shutdown
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_after_teardown_registers_nothing() {
    let gateway = Arc::new(MockGateway::new());
    let synchronizer = StateSynchronizer::new(gateway.clone());
    let shutdown = Shutdown::new();

    shutdown.trigger();
    synchronizer.run(gateway.as_ref(), &shutdown);

    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(gateway.proxy_tree_calls.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.state_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_select_is_dropped() {
    let gateway = Arc::new(MockGateway::new());
    gateway.activate_latency_ms.store(200, Ordering::SeqCst);
    let synchronizer = StateSynchronizer::new(gateway.clone());
    let coordinator = Arc::new(SelectionCoordinator::new(
        gateway.clone(),
        synchronizer.handle(),
    ));

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.select("Auto", "a").await })
    };
    tokio::task::yield_now().await;

    // Second call while the first is pending: discarded, backend untouched.
    let second = coordinator.select("Auto", "b").await.unwrap();
    assert_eq!(second, SelectOutcome::Dropped);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first, SelectOutcome::Applied);
    assert_eq!(gateway.activate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.tray_sync_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_select_clears_pending_for_retry() {
    let gateway = Arc::new(MockGateway::new());
    gateway.activate_fail.store(true, Ordering::SeqCst);
    let synchronizer = StateSynchronizer::new(gateway.clone());
    let coordinator = SelectionCoordinator::new(gateway.clone(), synchronizer.handle());

    assert!(coordinator.select("Auto", "a").await.is_err());
    assert!(!coordinator.is_pending());
    // No tray sync and no refresh on the failure path.
    assert_eq!(gateway.tray_sync_calls.load(Ordering::SeqCst), 0);

    gateway.activate_fail.store(false, Ordering::SeqCst);
    let retry = coordinator.select("Auto", "a").await.unwrap();
    assert_eq!(retry, SelectOutcome::Applied);
    assert_eq!(gateway.activate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_select_forces_proxy_topic_refresh() {
    let gateway = Arc::new(MockGateway::new());
    let (synchronizer, _shutdown) = started_synchronizer(&gateway);
    let coordinator = SelectionCoordinator::new(gateway.clone(), synchronizer.handle());

    time::sleep(Duration::from_millis(200)).await;
    let before = gateway.proxy_tree_calls.load(Ordering::SeqCst);

    let outcome = coordinator.select("Auto", "b").await.unwrap();
    assert_eq!(outcome, SelectOutcome::Applied);

    // Still inside the dedupe window, yet the forced refresh goes through.
    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.proxy_tree_calls.load(Ordering::SeqCst), before + 1);
}

#[tokio::test(start_paused = true)]
async fn test_backend_status_topic_tracks_state() {
    let gateway = Arc::new(MockGateway::new());
    gateway.set_backend_state(BackendState::NotRunning);
    let (synchronizer, _shutdown) = started_synchronizer(&gateway);

    time::sleep(Duration::from_secs(1)).await;
    let status = synchronizer.snapshot().backend.expect("no backend status");
    assert_eq!(status.state, BackendState::NotRunning);

    // The startup check kicks the backend; the topic converges on Running.
    time::sleep(Duration::from_secs(15)).await;
    let status = synchronizer.snapshot().backend.expect("no backend status");
    assert_eq!(status.state, BackendState::Running);
}
