use super::DeleteStrategy;
use crate::core::{DbError, Result};
use crate::interface::CarRepository;
use async_trait::async_trait;
use tracing::{Level, event};

/// Loads every car of a make, then deletes each one by id and the version it was read at.
///
/// A delete that affects no row means someone else changed or removed the car
/// after it was read, and becomes `OptimisticLockConflict`. The first conflict
/// ends the call; the caller's transaction is expected to roll back.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionCheckedDeleter;

#[async_trait]
impl DeleteStrategy for VersionCheckedDeleter {
    fn name(&self) -> &'static str {
        "version-checked"
    }

    async fn delete_by_make(&self, repo: &dyn CarRepository, make: &str) -> Result<u64> {
        let cars = repo.find_all_by_make(make).await?;
        event!(Level::DEBUG, make = %make, loaded = cars.len() as u64, "cars loaded for deletion");

        let mut deleted = 0;
        for record in cars {
            let affected = repo.delete(record.id, record.version).await?;
            if affected == 0 {
                event!(
                    Level::DEBUG,
                    car_id = %record.id,
                    expected_version = record.version,
                    "stale version detected"
                );
                return Err(DbError::OptimisticLockConflict {
                    id: record.id,
                    expected_version: record.version,
                });
            }
            deleted += affected;
        }
        Ok(deleted)
    }
}
