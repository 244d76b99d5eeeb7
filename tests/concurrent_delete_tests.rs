/// Concurrent delete tests
///
/// Version-checked and bulk deletes racing on the same rows from many units
/// Run with: cargo test --test concurrent_delete_tests

use async_trait::async_trait;
use occ_delete_demo::{
    BulkDeleter, CarRepository, CarStore, ConcurrencyHarness, DbError, DeleteStrategy,
    HarnessConfig, StrategyKind, UnitOutcome, VersionCheckedDeleter, expect_clean,
    expect_conflict, seed_fords,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const REPEATS: usize = 20;

async fn seeded_harness(units: usize) -> (CarStore, ConcurrencyHarness) {
    let store = CarStore::new();
    seed_fords(&store).await.unwrap();
    let harness = ConcurrencyHarness::new(store.clone(), HarnessConfig::new().units(units)).unwrap();
    (store, harness)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_version_checked_delete_conflicts() {
    for _ in 0..REPEATS {
        let (store, harness) = seeded_harness(10).await;

        let report = harness.run(Arc::new(VersionCheckedDeleter), "Ford").await;

        expect_conflict(&report).unwrap();
        assert_eq!(report.units, 10);
        assert_eq!(report.outcomes.len(), 10);
        // Exactly one unit claims the first Ford; every other unit trips on it
        assert_eq!(report.conflict_count(), 9);
        assert_eq!(report.total_deleted(), 2);
        assert_eq!(store.count_by_make("Ford").await.unwrap(), 0);
        assert_eq!(store.active_transactions().await, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bulk_delete_never_conflicts() {
    for _ in 0..REPEATS {
        let (store, harness) = seeded_harness(10).await;

        let report = harness.run(Arc::new(BulkDeleter), "Ford").await;

        expect_clean(&report).unwrap();
        assert_eq!(report.total_deleted(), 2);
        assert_eq!(store.count_by_make("Ford").await.unwrap(), 0);
        assert_eq!(report.clone().into_result().unwrap(), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_units_are_enough_to_conflict() {
    let (_store, harness) = seeded_harness(2).await;
    let report = harness
        .run(StrategyKind::VersionChecked.strategy(), "Ford")
        .await;
    assert_eq!(report.conflict_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conflicted_units_leave_other_makes_alone() {
    let (store, harness) = seeded_harness(10).await;
    store
        .create(occ_delete_demo::Car::new("Opel", "Astra"))
        .await
        .unwrap();

    let report = harness.run(Arc::new(VersionCheckedDeleter), "Ford").await;
    assert!(report.conflict_count() > 0);
    assert_eq!(store.count_by_make("Opel").await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_trial_failed_lists_all_conflicts() {
    let (_store, harness) = seeded_harness(10).await;
    let report = harness.run(Arc::new(VersionCheckedDeleter), "Ford").await;
    let conflicted: Vec<usize> = report.failures().map(|f| f.unit).collect();

    match report.into_result() {
        Err(DbError::TrialFailed(failure)) => {
            assert_eq!(failure.failures.len(), 9);
            assert_eq!(failure.conflict_count(), 9);
            let units: Vec<usize> = failure.failures.iter().map(|f| f.unit).collect();
            assert_eq!(units, conflicted);
            assert_eq!(failure.to_string().lines().count(), 10);
        }
        other => panic!("Expected TrialFailed, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bulk_delete_on_empty_make_is_clean() {
    let (store, harness) = seeded_harness(10).await;
    let report = harness.run(Arc::new(BulkDeleter), "Tesla").await;

    expect_clean(&report).unwrap();
    assert_eq!(report.total_deleted(), 0);
    assert_eq!(store.count_by_make("Ford").await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_closed_store_fails_every_unit() {
    let (store, harness) = seeded_harness(10).await;
    store.close();

    let report = harness.run(Arc::new(BulkDeleter), "Ford").await;

    assert_eq!(report.failure_count(), 10);
    assert!(report.failures().all(|f| f.error == DbError::StoreClosed));
    assert!(expect_clean(&report).is_err());
    assert!(expect_conflict(&report).is_err());
}

/// Panics on its first call, then behaves like a bulk delete.
struct PanicOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl DeleteStrategy for PanicOnce {
    fn name(&self) -> &'static str {
        "panic-once"
    }

    async fn delete_by_make(&self, repo: &dyn CarRepository, make: &str) -> occ_delete_demo::Result<u64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("strategy blew up");
        }
        repo.delete_all_by_make(make).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_unit_is_captured() {
    let (store, harness) = seeded_harness(4).await;
    let strategy = Arc::new(PanicOnce {
        calls: AtomicUsize::new(0),
    });

    let report = harness.run(strategy, "Ford").await;

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.failure_count(), 1);
    let failure = report.failures().next().unwrap();
    assert!(matches!(failure.error, DbError::ExecutionError(_)));
    assert!(failure.error.to_string().contains("panicked"));

    let succeeded = report
        .outcomes
        .iter()
        .filter(|o| matches!(o, UnitOutcome::Succeeded { .. }))
        .count();
    assert_eq!(succeeded, 3);
    assert_eq!(report.total_deleted(), 2);
    assert_eq!(store.count_by_make("Ford").await.unwrap(), 0);
}
