// ============================================================================
// Delete Strategies
// ============================================================================
//
// Two ways to remove every car of one make inside a single transaction:
// - VersionCheckedDeleter: load each row, then delete it by id + version
// - BulkDeleter: one set-based delete on the make alone
//
// ============================================================================

pub mod bulk;
pub mod version_checked;

pub use bulk::BulkDeleter;
pub use version_checked::VersionCheckedDeleter;

use crate::core::{DbError, Result};
use crate::interface::CarRepository;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait DeleteStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Delete every car with `make` through `repo`, returning the rows removed.
    async fn delete_by_make(&self, repo: &dyn CarRepository, make: &str) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    VersionChecked,
    Bulk,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 2] = [StrategyKind::VersionChecked, StrategyKind::Bulk];

    pub fn strategy(self) -> Arc<dyn DeleteStrategy> {
        match self {
            StrategyKind::VersionChecked => Arc::new(VersionCheckedDeleter),
            StrategyKind::Bulk => Arc::new(BulkDeleter),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::VersionChecked => "version-checked",
            StrategyKind::Bulk => "bulk",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = DbError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "version-checked" | "version_checked" | "derived" => Ok(StrategyKind::VersionChecked),
            "bulk" | "explicit" => Ok(StrategyKind::Bulk),
            other => Err(DbError::ConfigError(format!(
                "unknown delete strategy '{other}', expected one of: version-checked, bulk"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_round_trips_through_name() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.as_str().parse::<StrategyKind>().unwrap(), kind);
            assert_eq!(kind.strategy().name(), kind.as_str());
        }
    }

    #[test]
    fn test_unknown_strategy_is_config_error() {
        let err = "truncate".parse::<StrategyKind>().unwrap_err();
        assert!(matches!(err, DbError::ConfigError(_)));
    }
}
