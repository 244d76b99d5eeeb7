use crate::core::{DbError, Result, TrialFailure, UnitFailure};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// What one execution unit ended with
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnitOutcome {
    Succeeded { unit: usize, deleted: u64 },
    Failed(UnitFailure),
}

impl UnitOutcome {
    pub fn unit(&self) -> usize {
        match self {
            UnitOutcome::Succeeded { unit, .. } => *unit,
            UnitOutcome::Failed(failure) => failure.unit,
        }
    }

    pub fn failure(&self) -> Option<&UnitFailure> {
        match self {
            UnitOutcome::Failed(failure) => Some(failure),
            UnitOutcome::Succeeded { .. } => None,
        }
    }
}

/// Every unit's outcome from one trial, ordered by unit index.
#[derive(Debug, Clone, Serialize)]
pub struct TrialReport {
    pub trial_id: Uuid,
    pub strategy: String,
    pub make: String,
    pub units: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcomes: Vec<UnitOutcome>,
}

impl TrialReport {
    pub fn failures(&self) -> impl Iterator<Item = &UnitFailure> {
        self.outcomes.iter().filter_map(UnitOutcome::failure)
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn conflict_count(&self) -> usize {
        self.failures()
            .filter(|f| f.error.is_optimistic_lock_conflict())
            .count()
    }

    /// Rows removed across all units that committed
    pub fn total_deleted(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|outcome| match outcome {
                UnitOutcome::Succeeded { deleted, .. } => *deleted,
                UnitOutcome::Failed(_) => 0,
            })
            .sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }

    /// Every failure of this trial, or `None` if all units succeeded.
    pub fn to_failure(&self) -> Option<TrialFailure> {
        if self.is_clean() {
            return None;
        }
        Some(TrialFailure {
            strategy: self.strategy.clone(),
            units: self.units,
            failures: self.failures().cloned().collect(),
        })
    }

    /// Total rows deleted, or `TrialFailed` carrying all captured failures.
    pub fn into_result(self) -> Result<u64> {
        match self.to_failure() {
            Some(failure) => Err(DbError::TrialFailed(failure)),
            None => Ok(self.total_deleted()),
        }
    }
}
