use super::report::TrialReport;
use crate::core::TrialFailure;
use crate::delete::StrategyKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleViolation {
    #[error(
        "Trial {trial_id} ({strategy}) raised no optimistic lock conflict across {units} units ({failures} other failures)"
    )]
    MissingConflict {
        trial_id: String,
        strategy: String,
        units: usize,
        failures: usize,
    },

    #[error("Trial {trial_id} was expected to finish cleanly. {failure}")]
    UnexpectedFailures {
        trial_id: String,
        failure: TrialFailure,
    },
}

/// At least one unit must have failed with `OptimisticLockConflict`.
pub fn expect_conflict(report: &TrialReport) -> Result<(), OracleViolation> {
    if report.conflict_count() > 0 {
        return Ok(());
    }
    Err(OracleViolation::MissingConflict {
        trial_id: report.trial_id.to_string(),
        strategy: report.strategy.clone(),
        units: report.units,
        failures: report.failure_count(),
    })
}

/// No unit may have failed, for any reason.
pub fn expect_clean(report: &TrialReport) -> Result<(), OracleViolation> {
    match report.to_failure() {
        None => Ok(()),
        Some(failure) => Err(OracleViolation::UnexpectedFailures {
            trial_id: report.trial_id.to_string(),
            failure,
        }),
    }
}

/// Overlapping version-checked deletes must conflict; bulk deletes must not.
pub fn verify(kind: StrategyKind, report: &TrialReport) -> Result<(), OracleViolation> {
    match kind {
        StrategyKind::VersionChecked => expect_conflict(report),
        StrategyKind::Bulk => expect_clean(report),
    }
}
