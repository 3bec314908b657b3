mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeTransform, Gate, Harness, quick_policy};
use tokio_util::sync::CancellationToken;
use unmark_core::{DispatchOutcome, ReconciliationSweeper, SweepSettings};

fn sweeper(harness: &Harness) -> ReconciliationSweeper {
    ReconciliationSweeper::new(
        &harness.input,
        harness.coordinator.clone(),
        quick_policy(),
        SweepSettings::default(),
    )
}

#[tokio::test]
async fn crash_recovery_reopens_entry_without_output() {
    let harness = Harness::with_ledger(FakeTransform::default(), &["20251104_1209_abc.mp4"]);
    let clip = harness.clip("20251104_1209_abc.mp4");
    assert!(harness.coordinator.is_known(&clip).await);

    let report = sweeper(&harness).tick().await.unwrap();

    assert_eq!(report.reopened, 1);
    assert_eq!(report.pending, 1);
    let (dispatched, outcome) = report.dispatched.unwrap();
    assert_eq!(dispatched, clip);
    assert!(matches!(outcome, DispatchOutcome::Completed { .. }));
    assert_eq!(harness.transform.calls(), 1);
    assert!(harness.output.join("wr_20251104_1209.mp4").exists());
    assert!(harness.ledger_on_disk().contains(&clip.display().to_string()));
}

#[tokio::test]
async fn settled_entries_are_left_alone() {
    let harness = Harness::with_ledger(FakeTransform::default(), &["20251104_1209_abc.mp4"]);
    let clip = harness.clip("20251104_1209_abc.mp4");
    std::fs::write(harness.output.join("wr_20251104_1209.mp4"), b"done").unwrap();

    let report = sweeper(&harness).tick().await.unwrap();

    assert_eq!(report.scanned, 1);
    assert_eq!(report.pending, 0);
    assert_eq!(report.dispatched, None);
    assert!(harness.coordinator.is_known(&clip).await);
    assert_eq!(harness.transform.calls(), 0);
}

#[tokio::test]
async fn newest_pending_clip_goes_first() {
    let harness = Harness::new(FakeTransform::default());
    let older = harness.clip("20251101_1200_a.mp4");
    let newer = harness.clip("nested/20251102_1300_b.mp4");
    harness.clip("unrelated.mp4");

    let sweeper = sweeper(&harness);

    let first = sweeper.tick().await.unwrap();
    assert_eq!(first.pending, 2);
    assert_eq!(first.dispatched.map(|(path, _)| path), Some(newer.clone()));

    let second = sweeper.tick().await.unwrap();
    assert_eq!(second.pending, 1);
    assert_eq!(second.dispatched.map(|(path, _)| path), Some(older.clone()));

    let third = sweeper.tick().await.unwrap();
    assert_eq!(third.dispatched, None);

    assert_eq!(harness.transform.inputs(), vec![newer, older]);
}

#[tokio::test]
async fn in_flight_paths_are_not_touched() {
    let gate = Gate::default();
    let harness = Harness::new(FakeTransform::gated(gate.clone()));
    let clip = harness.clip("20251104_1209_abc.mp4");

    let running = {
        let coordinator = harness.coordinator.clone();
        let clip = clip.clone();
        tokio::spawn(async move { coordinator.dispatch(&clip).await })
    };
    gate.started.notified().await;

    let report = sweeper(&harness).tick().await.unwrap();
    assert_eq!(report.in_flight, 1);
    assert_eq!(report.reopened, 0);
    assert_eq!(report.dispatched, None);
    assert!(harness.coordinator.is_known(&clip).await);

    gate.release.notify_one();
    let outcome = running.await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Completed { .. }));
    assert_eq!(harness.transform.calls(), 1);
}

#[tokio::test]
async fn missing_root_fails_the_tick() {
    let harness = Harness::new(FakeTransform::default());
    let sweeper = ReconciliationSweeper::new(
        harness.dir.path().join("gone"),
        harness.coordinator.clone(),
        quick_policy(),
        SweepSettings::default(),
    );
    assert!(sweeper.tick().await.is_err());
}

#[tokio::test]
async fn run_loop_drains_backlog_until_cancelled() {
    let harness = Harness::new(FakeTransform::default());
    harness.clip("20251101_1200_a.mp4");
    harness.clip("20251102_1300_b.mp4");

    let sweeper = Arc::new(ReconciliationSweeper::new(
        &harness.input,
        harness.coordinator.clone(),
        quick_policy(),
        SweepSettings {
            interval_ms: 10,
            run_on_startup: true,
        },
    ));

    let token = CancellationToken::new();
    let task = tokio::spawn(sweeper.run(token.clone()));

    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while harness.transform.calls() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "sweeper did not drain the backlog");

    token.cancel();
    task.await.unwrap();

    assert!(harness.output.join("wr_20251101_1200.mp4").exists());
    assert!(harness.output.join("wr_20251102_1300.mp4").exists());
}
