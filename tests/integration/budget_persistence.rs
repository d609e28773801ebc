//! Budget state surviving process restarts

use std::sync::Arc;

use chrono::NaiveDate;
use infra_monitoring::budget::{
    BudgetPhase, BudgetStore, BudgetTracker, FileBudgetStore, PriceTable,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
}

fn tracker(path: &std::path::Path, d: u32) -> BudgetTracker {
    BudgetTracker::new(
        Arc::new(FileBudgetStore::new(path)),
        1.0,
        PriceTable::default(),
    )
    .with_clock(move || day(d))
}

#[tokio::test]
async fn test_spend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("budget_state.json");

    let first = tracker(&path, 10);
    first.record_usage(500_000, 50_000).await.unwrap();
    drop(first);

    // a new process on the same day picks up where the last one stopped
    let second = tracker(&path, 10);
    let status = second.status().await.unwrap();
    assert!((status.spent_today - 0.6).abs() < 1e-9);
    assert!(second.can_afford(0.39).await);
    assert!(!second.can_afford(0.4).await);

    second.record_usage(0, 150_000).await.unwrap();
    let status = second.status().await.unwrap();
    assert_eq!(status.phase, BudgetPhase::Exhausted);
}

#[tokio::test]
async fn test_next_day_starts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("budget_state.json");

    tracker(&path, 10).record_usage(1_000_000, 0).await.unwrap();

    let tomorrow = tracker(&path, 11);
    assert!(tomorrow.can_afford(0.5).await);

    let saved = FileBudgetStore::new(&path).load().await.unwrap().unwrap();
    assert_eq!(saved.date, day(11));
    assert_eq!(saved.spent, 0.0);
}

#[tokio::test]
async fn test_corrupt_state_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("budget_state.json");
    std::fs::write(&path, "{\"date\": \"not a date\"").unwrap();

    let tracker = tracker(&path, 10);
    assert_eq!(tracker.status().await.unwrap().spent_today, 0.0);

    tracker.record_usage(100_000, 0).await.unwrap();
    let saved = FileBudgetStore::new(&path).load().await.unwrap().unwrap();
    assert!((saved.spent - 0.08).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_processes_on_one_file_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("budget_state.json");

    // each tracker owns its own store instance, as two processes would
    let trackers: Vec<_> = (0..2)
        .map(|_| {
            BudgetTracker::new(
                Arc::new(FileBudgetStore::new(&path)),
                100.0,
                PriceTable::default(),
            )
            .with_clock(|| day(12))
        })
        .collect();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let tracker = trackers[i % 2].clone();
            tokio::spawn(async move { tracker.record_usage(1_000_000, 0).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let saved = FileBudgetStore::new(&path).load().await.unwrap().unwrap();
    assert!((saved.spent - 16.0).abs() < 1e-6);
}
