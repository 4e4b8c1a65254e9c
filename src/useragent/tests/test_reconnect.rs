use super::common::*;
use crate::signaling::SignalEvent;
use crate::useragent::Command;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_clean_disconnect_is_ignored() {
    let engine = FakeEngine::new();
    let harness = spawn_agent(prod_settings(), Some(engine.clone()));
    settle().await;

    harness
        .handle
        .signal(SignalEvent::TransportDisconnected { error: None })
        .unwrap();
    settle().await;

    assert!(harness.notifier.current_error().is_none());
    assert_eq!(engine.reconnect_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_success_resolves_error() {
    let engine = FakeEngine::new();
    let harness = spawn_agent(prod_settings(), Some(engine.clone()));
    settle().await;

    harness
        .handle
        .signal(SignalEvent::TransportDisconnected {
            error: Some("websocket closed".to_string()),
        })
        .unwrap();
    settle().await;

    assert_eq!(engine.reconnect_attempts.load(Ordering::SeqCst), 1);
    // connect at startup plus the re-registration
    assert_eq!(engine.registers.load(Ordering::SeqCst), 2);
    assert!(harness.notifier.current_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_max_attempts() {
    let engine = FakeEngine::with_failing_reconnect();
    let harness = spawn_agent(prod_settings(), Some(engine.clone()));
    settle().await;

    harness
        .handle
        .signal(SignalEvent::TransportDisconnected {
            error: Some("websocket closed".to_string()),
        })
        .unwrap();

    // backoffs sum to roughly a minute; run well past them
    tokio::time::sleep(Duration::from_secs(120)).await;

    // attempts 0 through 5, never a seventh
    assert_eq!(engine.reconnect_attempts.load(Ordering::SeqCst), 6);
    let error = harness.notifier.current_error().unwrap();
    assert!(error.text.contains("couldn't be reestablished"));
    assert!(!error.non_blocking);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(engine.reconnect_attempts.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_past_limit_fail_permanently() {
    let engine = FakeEngine::new();
    let harness = spawn_agent(prod_settings(), Some(engine.clone()));
    settle().await;

    harness
        .handle
        .command(Command::AttemptReconnect { attempt: 6 })
        .unwrap();
    settle().await;

    assert_eq!(engine.reconnect_attempts.load(Ordering::SeqCst), 0);
    let error = harness.notifier.current_error().unwrap();
    assert!(error.text.contains("couldn't be reestablished"));
}
