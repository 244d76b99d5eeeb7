use super::types::CarId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Optimistic lock conflict on car {id}: expected version {expected_version}")]
    OptimisticLockConflict { id: CarId, expected_version: u64 },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Store is closed")]
    StoreClosed,

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    TrialFailed(TrialFailure),
}

impl DbError {
    pub fn is_optimistic_lock_conflict(&self) -> bool {
        matches!(self, DbError::OptimisticLockConflict { .. })
    }

    /// Connectivity, constraint and internal errors raised by the store itself.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            DbError::ConstraintViolation(_)
                | DbError::TransactionError(_)
                | DbError::StoreClosed
                | DbError::ExecutionError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// A single failed execution unit inside a trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub unit: usize,
    #[serde(serialize_with = "serialize_error")]
    pub error: DbError,
}

/// Every failure captured by one trial, ordered by unit index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialFailure {
    pub strategy: String,
    pub units: usize,
    pub failures: Vec<UnitFailure>,
}

impl TrialFailure {
    pub fn conflict_count(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.error.is_optimistic_lock_conflict())
            .count()
    }
}

impl fmt::Display for TrialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trial '{}' failed in {} of {} units",
            self.strategy,
            self.failures.len(),
            self.units
        )?;
        for failure in &self.failures {
            write!(f, "\n  unit {}: {}", failure.unit, failure.error)?;
        }
        Ok(())
    }
}

fn serialize_error<S: serde::Serializer>(err: &DbError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&err.to_string())
}
