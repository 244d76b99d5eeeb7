use super::config::HarnessConfig;
use super::report::{TrialReport, UnitOutcome};
use crate::core::{DbError, Result, UnitFailure};
use crate::delete::DeleteStrategy;
use crate::storage::CarStore;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Barrier;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Runs one delete strategy from many concurrent units against a shared store.
pub struct ConcurrencyHarness {
    store: CarStore,
    config: HarnessConfig,
}

impl ConcurrencyHarness {
    pub fn new(store: CarStore, config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Run `config.units` units of `strategy` on `make` and wait for all of them.
    ///
    /// Each unit opens its transaction, then waits until every other unit has
    /// opened one too, so every read sees the same committed rows. A unit that
    /// panics is reported as an `ExecutionError` failure.
    pub async fn run(&self, strategy: Arc<dyn DeleteStrategy>, make: &str) -> TrialReport {
        let trial_id = Uuid::new_v4();
        let units = self.config.units;
        let span = info_span!(
            "harness.trial",
            trial_id = %trial_id,
            strategy = strategy.name(),
            make = %make,
            units = units as u64
        );

        async move {
            let started_at = Utc::now();
            let start = Instant::now();
            let gate = Arc::new(Barrier::new(units));
            let make: Arc<str> = Arc::from(make);

            let handles: Vec<_> = (0..units)
                .map(|unit| {
                    let unit_span = info_span!("harness.unit", unit = unit as u64);
                    tokio::spawn(
                        run_unit(
                            unit,
                            self.store.clone(),
                            Arc::clone(&strategy),
                            Arc::clone(&make),
                            Arc::clone(&gate),
                        )
                        .instrument(unit_span),
                    )
                })
                .collect();

            let outcomes: Vec<UnitOutcome> = join_all(handles)
                .await
                .into_iter()
                .enumerate()
                .map(|(unit, joined)| match joined {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        event!(Level::ERROR, unit = unit as u64, error = %err, "unit panicked");
                        UnitOutcome::Failed(UnitFailure {
                            unit,
                            error: DbError::ExecutionError(format!("unit {unit} panicked: {err}")),
                        })
                    }
                })
                .collect();

            let report = TrialReport {
                trial_id,
                strategy: strategy.name().to_string(),
                make: make.to_string(),
                units,
                started_at,
                elapsed_ms: start.elapsed().as_millis() as u64,
                outcomes,
            };
            event!(
                Level::INFO,
                failures = report.failure_count() as u64,
                conflicts = report.conflict_count() as u64,
                deleted = report.total_deleted(),
                elapsed_ms = report.elapsed_ms,
                "trial finished"
            );
            report
        }
        .instrument(span)
        .await
    }
}

async fn run_unit(
    unit: usize,
    store: CarStore,
    strategy: Arc<dyn DeleteStrategy>,
    make: Arc<str>,
    gate: Arc<Barrier>,
) -> UnitOutcome {
    let session = store.begin().await;
    // Units that could not open a transaction still release the gate for the others.
    gate.wait().await;

    let session = match session {
        Ok(session) => session,
        Err(error) => return failed(unit, error),
    };

    match strategy.delete_by_make(&session, &make).await {
        Ok(deleted) => match session.commit().await {
            Ok(()) => {
                event!(Level::DEBUG, deleted, "unit committed");
                UnitOutcome::Succeeded { unit, deleted }
            }
            Err(error) => failed(unit, error),
        },
        Err(error) => {
            if let Err(rollback_err) = session.rollback().await {
                event!(Level::WARN, error = %rollback_err, "rollback failed");
            }
            failed(unit, error)
        }
    }
}

fn failed(unit: usize, error: DbError) -> UnitOutcome {
    if error.is_optimistic_lock_conflict() {
        event!(Level::DEBUG, error = %error, "unit conflicted");
    } else {
        event!(Level::WARN, error = %error, "unit failed");
    }
    UnitOutcome::Failed(UnitFailure { unit, error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Car;
    use crate::delete::{BulkDeleter, VersionCheckedDeleter};

    async fn store_with_fords() -> CarStore {
        let store = CarStore::new();
        store.create(Car::new("Ford", "Focus")).await.unwrap();
        store.create(Car::new("Ford", "Fiesta")).await.unwrap();
        store
    }

    #[test]
    fn test_zero_units_rejected() {
        let result = ConcurrencyHarness::new(CarStore::new(), HarnessConfig::new().units(0));
        assert!(matches!(result, Err(DbError::ConfigError(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_unit_version_checked_is_clean() {
        let store = store_with_fords().await;
        let harness = ConcurrencyHarness::new(store.clone(), HarnessConfig::new().units(1)).unwrap();

        let report = harness.run(Arc::new(VersionCheckedDeleter), "Ford").await;
        assert!(report.is_clean());
        assert_eq!(report.total_deleted(), 2);
        assert_eq!(store.count_by_make("Ford").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_outcomes_ordered_by_unit() {
        let store = store_with_fords().await;
        let harness = ConcurrencyHarness::new(store.clone(), HarnessConfig::new().units(6)).unwrap();

        let report = harness.run(Arc::new(BulkDeleter), "Ford").await;
        let units: Vec<usize> = report.outcomes.iter().map(UnitOutcome::unit).collect();
        assert_eq!(units, (0..6).collect::<Vec<_>>());
        assert_eq!(report.total_deleted(), 2);
        assert_eq!(store.active_transactions().await, 0);
    }
}
