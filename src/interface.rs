use crate::core::{Car, CarId, CarPatch, CarRecord, Result};
use async_trait::async_trait;

/// Create/read/update/delete contract over car rows.
///
/// Implementations are scoped to one transaction: reads see that
/// transaction's snapshot, writes are evaluated against the latest row
/// versions. The deletion strategies only depend on this trait.
#[async_trait]
pub trait CarRepository: Send + Sync {
    /// Insert a new car. The store assigns its id and version 0.
    async fn save(&self, car: Car) -> Result<CarRecord>;

    async fn find_by_id(&self, id: CarId) -> Result<Option<CarRecord>>;

    /// Every visible car with the given make, with id and version as read.
    async fn find_all_by_make(&self, make: &str) -> Result<Vec<CarRecord>>;

    async fn count_by_make(&self, make: &str) -> Result<usize>;

    /// `UPDATE cars SET .. WHERE id = ? AND version = ?`, returns rows affected (0 or 1).
    async fn update(&self, id: CarId, expected_version: u64, patch: CarPatch) -> Result<u64>;

    /// `DELETE FROM cars WHERE id = ? AND version = ?`, returns rows affected (0 or 1).
    ///
    /// Zero rows is not an error here; callers decide whether it is a conflict.
    async fn delete(&self, id: CarId, expected_version: u64) -> Result<u64>;

    /// `DELETE FROM cars WHERE make = ?`, returns rows affected. Never conflicts.
    ///
    /// Matching rows held by another live transaction are waited for, then
    /// deleted if that transaction rolled back.
    async fn delete_all_by_make(&self, make: &str) -> Result<u64>;
}
