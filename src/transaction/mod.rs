// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Snapshot isolation over MVCC row versions:
// - State Pattern: Active -> Committed/Aborted
// - Command Pattern: recorded Changes are reversed on rollback
// - Copy-on-Write: active id set shared by snapshots
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{TransactionInfo, TransactionManager};
pub use state::{Transaction, TransactionId, TransactionState};
