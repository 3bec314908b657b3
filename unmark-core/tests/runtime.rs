mod common;

use std::time::Duration;

use common::{FakeTransform, Gate, Harness, quick_policy};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use unmark_core::{SweepSettings, WatchError, WatchRuntime};

/// Sweeps effectively disabled so only filesystem events drive dispatch.
fn events_only() -> SweepSettings {
    SweepSettings {
        interval_ms: 600_000,
        run_on_startup: false,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watched_clip_is_processed_and_shutdown_waits_for_it() {
    let gate = Gate::default();
    let harness = Harness::new(FakeTransform::gated(gate.clone()));

    let stale = harness.coordinator.progress().path().to_path_buf();
    std::fs::write(
        &stale,
        r#"{"percent":40,"timestamp":1.0,"filename":"old.mp4","isActive":true}"#,
    )
    .unwrap();

    let runtime = WatchRuntime::new(
        &harness.input,
        harness.coordinator.clone(),
        quick_policy(),
        events_only(),
    )
    .unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(runtime.run(shutdown.clone()));

    // The stale record is cleared once the watcher is installed.
    assert!(wait_until(|| !stale.exists()).await, "stale progress was not cleared");

    let clip = harness.clip("20251104_1209_live.mp4");
    timeout(Duration::from_secs(5), gate.started.notified())
        .await
        .expect("transform never started for the new clip");

    shutdown.cancel();
    sleep(Duration::from_millis(100)).await;
    assert!(!task.is_finished(), "runtime returned while a dispatch was running");

    gate.release.notify_one();
    timeout(Duration::from_secs(5), task)
        .await
        .expect("runtime did not stop after the dispatch finished")
        .unwrap()
        .unwrap();

    assert_eq!(harness.transform.calls(), 1);
    assert!(harness.output.join("wr_20251104_1209.mp4").exists());
    // Events arrive under the resolved root.
    let resolved = std::fs::canonicalize(&clip).unwrap();
    assert!(harness.coordinator.is_known(&resolved).await);
    assert!(!stale.exists());
}

#[tokio::test]
async fn cancelled_runtime_stops_without_events() {
    let harness = Harness::new(FakeTransform::default());
    let runtime = WatchRuntime::new(
        &harness.input,
        harness.coordinator.clone(),
        quick_policy(),
        events_only(),
    )
    .unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    timeout(Duration::from_secs(5), runtime.run(shutdown))
        .await
        .expect("runtime ignored cancellation")
        .unwrap();
    assert_eq!(harness.transform.calls(), 0);
}

#[test]
fn missing_root_is_rejected_up_front() {
    let harness = Harness::new(FakeTransform::default());
    let err = WatchRuntime::new(
        &harness.dir.path().join("missing"),
        harness.coordinator.clone(),
        quick_policy(),
        events_only(),
    )
    .unwrap_err();
    assert!(matches!(err, WatchError::MissingRoot(_)));
}
