use super::DeleteStrategy;
use crate::core::Result;
use crate::interface::CarRepository;
use async_trait::async_trait;

/// One set-based delete on the make. No read step and no version predicate,
/// so there is nothing to conflict on; zero rows is a valid result.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkDeleter;

#[async_trait]
impl DeleteStrategy for BulkDeleter {
    fn name(&self) -> &'static str {
        "bulk"
    }

    async fn delete_by_make(&self, repo: &dyn CarRepository, make: &str) -> Result<u64> {
        repo.delete_all_by_make(make).await
    }
}
