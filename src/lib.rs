// ============================================================================
// occ-delete-demo Library
// ============================================================================
//
// Compares two ways of deleting every car of one make when many callers do it
// at the same time:
// - version-checked: load rows, delete each by id + version (conflicts)
// - bulk: one delete on the make alone (never conflicts)
//
// ============================================================================

pub mod core;
pub mod delete;
pub mod harness;
pub mod interface;
pub mod storage;
pub mod transaction;

pub use core::{Car, CarId, CarPatch, CarRecord, DbError, Result, TrialFailure, UnitFailure};
pub use delete::{BulkDeleter, DeleteStrategy, StrategyKind, VersionCheckedDeleter};
pub use harness::{
    ConcurrencyHarness, HarnessConfig, OracleViolation, TrialReport, UnitOutcome, expect_clean,
    expect_conflict,
};
pub use interface::CarRepository;
pub use storage::{CarStore, Session};

// ============================================================================
// Demo data
// ============================================================================

/// Insert the two Fords every scenario starts from, both at version 0.
///
/// # Examples
///
/// ```
/// use occ_delete_demo::{CarStore, seed_fords};
///
/// # tokio_test::block_on(async {
/// let store = CarStore::new();
/// let fords = seed_fords(&store).await.unwrap();
/// assert_eq!(fords.len(), 2);
/// assert_eq!(store.count_by_make("Ford").await.unwrap(), 2);
/// # })
/// ```
pub async fn seed_fords(store: &CarStore) -> Result<Vec<CarRecord>> {
    let focus = Car::new("Ford", "Focus")
        .year(2003)
        .color("Green")
        .horsepower(118)
        .price_cents(250_000);
    let fiesta = Car::new("Ford", "Fiesta")
        .year(2014)
        .color("BLue")
        .horsepower(98)
        .price_cents(250_000);

    Ok(vec![store.create(focus).await?, store.create(fiesta).await?])
}
