// ============================================================================
// Concurrency Harness
// ============================================================================
//
// Spawns N execution units that each run one delete strategy inside their own
// transaction, joins them, and keeps every outcome. The oracle then checks the
// report against the expected behavior of the strategy.
//
// ============================================================================

pub mod config;
pub mod oracle;
pub mod report;
pub mod runner;

pub use config::HarnessConfig;
pub use oracle::{OracleViolation, expect_clean, expect_conflict, verify};
pub use report::{TrialReport, UnitOutcome};
pub use runner::ConcurrencyHarness;
