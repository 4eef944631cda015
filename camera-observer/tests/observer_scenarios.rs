use camera_observer::{FaultObserver, MessageHandler, MissingFpsPolicy, SwitchCommand};
use camera_observer_devkit::{ObserverHarness, RecordingController};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn stalled_mapped_camera_triggers_one_restart() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();

    harness.send_json(&json!({"cameras": {"front": {"camera_fps": 0, "pid": 42}}})).unwrap();
    let outcomes = harness.settle().await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].device_id, "switch-1");
    assert_eq!(outcomes[0].camera_id, "front");
    assert!(outcomes[0].succeeded());
    assert_eq!(
        harness.controller.commands_for("switch-1"),
        vec![SwitchCommand::Off, SwitchCommand::On]
    );
}

#[tokio::test(start_paused = true)]
async fn healthy_camera_triggers_nothing() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();

    harness.send_json(&json!({"cameras": {"front": {"camera_fps": 12.5, "pid": 42}}})).unwrap();

    assert!(harness.settle().await.is_empty());
    assert_eq!(harness.total_commands(), 0);
}

#[tokio::test(start_paused = true)]
async fn repeat_failure_one_second_later_is_suppressed() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();

    harness.send_json(&json!({"cameras": {"front": {"camera_fps": 0, "pid": 42}}})).unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;
    harness.send_json(&json!({"cameras": {"front": {"camera_fps": 0, "pid": 42}}})).unwrap();

    assert_eq!(harness.settle().await.len(), 1);
    assert_eq!(harness.restarts_started("switch-1"), 1);
}

#[tokio::test(start_paused = true)]
async fn cooldown_expiry_allows_another_restart() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();

    // t=0 restart, t=60s suppressed, t=60s+5min+1s restart again
    harness.send_stats(&[("front", 0.0)]);
    tokio::time::advance(Duration::from_secs(60)).await;
    harness.send_stats(&[("front", 0.0)]);
    tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
    harness.send_stats(&[("front", 0.0)]);

    harness.settle().await;
    assert_eq!(harness.restarts_started("switch-1"), 2);
}

#[tokio::test(start_paused = true)]
async fn unmapped_stalled_camera_is_ignored() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();

    harness.send_stats(&[("garage", 0.0)]);

    assert!(harness.settle().await.is_empty());
    assert_eq!(harness.total_commands(), 0);
    assert!(harness.observer.cooldowns().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_messages_do_not_crash_or_trigger() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();

    harness.send_raw(b"");
    harness.send_raw(b"{\"cameras\": {\"front\": ");
    harness.send_raw(b"[\"front\", 0]");
    harness.send_json(&json!({"cameras": {"front": {"camera_fps": "zero"}}})).unwrap();

    assert!(harness.settle().await.is_empty());
    assert_eq!(harness.total_commands(), 0);

    // still alive afterwards
    harness.send_stats(&[("front", 0.0)]);
    assert_eq!(harness.settle().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn several_stalled_cameras_are_handled_independently() {
    let harness = ObserverHarness::builder()
        .map("front", "switch-1")
        .map("back", "switch-2")
        .map("side", "switch-3")
        .build();

    // side already restarted recently
    harness.send_stats(&[("side", 0.0)]);
    tokio::time::advance(Duration::from_secs(30)).await;

    harness.send_stats(&[("front", 0.0), ("back", 0.0), ("side", 0.0), ("yard", 0.0), ("porch", 24.0)]);
    harness.settle().await;

    assert_eq!(harness.restarts_started("switch-1"), 1);
    assert_eq!(harness.restarts_started("switch-2"), 1);
    assert_eq!(harness.restarts_started("switch-3"), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_off_leaves_device_alone_and_keeps_cooldown() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();
    harness.controller.fail_on("switch-1", SwitchCommand::Off);

    harness.send_stats(&[("front", 0.0)]);
    let outcomes = harness.settle().await;

    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].succeeded());
    assert_eq!(harness.controller.commands_for("switch-1"), vec![SwitchCommand::Off]);

    // the failed attempt still consumed the window
    harness.send_stats(&[("front", 0.0)]);
    assert!(harness.settle().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_on_is_reported_after_off() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();
    harness.controller.fail_on("switch-1", SwitchCommand::On);

    harness.send_stats(&[("front", 0.0)]);
    let outcomes = harness.settle().await;

    assert!(outcomes[0].error.as_deref().unwrap_or_default().contains("'on'"));
    assert_eq!(
        harness.controller.commands_for("switch-1"),
        vec![SwitchCommand::Off, SwitchCommand::On]
    );
}

#[tokio::test(start_paused = true)]
async fn handler_returns_before_restart_completes() {
    let harness = ObserverHarness::builder().map("front", "switch-1").build();

    harness.send_stats(&[("front", 0.0)]);
    // delivery returned; the restart runs in its own task
    assert_eq!(harness.in_flight(), 1);

    let early = harness.controller.get_sent_commands();
    assert!(!early.iter().any(|c| c.command == SwitchCommand::On));

    harness.settle().await;
    let sent = harness.controller.get_sent_commands();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].at - sent[0].at >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn missing_fps_policies() {
    let zero = ObserverHarness::builder().map("front", "switch-1").build();
    zero.send_json(&json!({"cameras": {"front": {"pid": 42}}})).unwrap();
    assert_eq!(zero.settle().await.len(), 1);

    let reject = ObserverHarness::builder()
        .map("front", "switch-1")
        .missing_fps(MissingFpsPolicy::Reject)
        .build();
    reject.send_json(&json!({"cameras": {"front": {"pid": 42}}})).unwrap();
    assert!(reject.settle().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn null_entries_do_not_hide_other_stalled_cameras() {
    let harness = ObserverHarness::builder()
        .map("front", "switch-1")
        .map("back", "switch-2")
        .build();

    harness
        .send_json(&json!({"cameras": {"front": null, "back": {"camera_fps": 0, "pid": 7}}}))
        .unwrap();
    harness.settle().await;

    // a null entry has no fps, so it reads as stalled
    assert_eq!(harness.restarts_started("switch-1"), 1);
    assert_eq!(harness.restarts_started("switch-2"), 1);

    harness.send_json(&json!({"cameras": null})).unwrap();
    assert!(harness.settle().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_deliveries_dispatch_at_most_once() {
    let controller = RecordingController::with_settle(Duration::from_millis(1));
    let mapping = HashMap::from([("front".to_string(), "switch-1".to_string())]);
    let observer = Arc::new(FaultObserver::new(Arc::new(controller.clone()), mapping));

    let payload = serde_json::to_vec(&json!({"cameras": {"front": {"camera_fps": 0.0, "pid": 1}}})).unwrap();
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let observer = observer.clone();
            let payload = payload.clone();
            tokio::spawn(async move { observer.handle("frigate/stats", &payload) })
        })
        .collect();
    for h in handles {
        h.await.unwrap();
    }

    let outcomes = observer.dispatcher().drain().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(controller.restarts_started("switch-1"), 1);
}
