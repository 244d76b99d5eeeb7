// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Change, Transaction, TransactionId, TransactionState};
use crate::core::{DbError, Result, Snapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct TransactionManager {
    state: RwLock<ManagerState>,
}

struct ManagerState {
    next_id: u64,
    transactions: HashMap<TransactionId, Transaction>,
    // Copy-on-Write (Arc) so every snapshot shares the set instead of copying it.
    active_ids: Arc<HashSet<u64>>,
}

impl ManagerState {
    fn view(&self, tx_id: u64) -> Snapshot {
        Snapshot {
            tx_id,
            active: Arc::clone(&self.active_ids),
            max_tx_id: self.next_id,
        }
    }

    fn deactivate(&mut self, txn_id: TransactionId) {
        if self.active_ids.contains(&txn_id.0) {
            let mut new_set = (*self.active_ids).clone();
            new_set.remove(&txn_id.0);
            self.active_ids = Arc::new(new_set);
        }
    }

    fn active_mut(&mut self, txn_id: TransactionId) -> Result<&mut Transaction> {
        self.transactions
            .get_mut(&txn_id)
            .ok_or_else(|| DbError::TransactionError(format!("Transaction {} not found", txn_id)))
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ManagerState {
                next_id: 1,
                transactions: HashMap::new(),
                active_ids: Arc::new(HashSet::new()),
            }),
        }
    }

    /// Start a transaction and take its snapshot.
    ///
    /// Id allocation, snapshot and registration happen under one lock so a
    /// later transaction can never observe this id as already committed.
    pub async fn begin(&self) -> (TransactionId, Snapshot) {
        let mut state = self.state.write().await;

        let txn_id = TransactionId(state.next_id);
        state.next_id += 1;

        let snapshot = Snapshot {
            tx_id: txn_id.0,
            active: Arc::clone(&state.active_ids),
            max_tx_id: txn_id.0,
        };

        let mut new_set = (*state.active_ids).clone();
        new_set.insert(txn_id.0);
        state.active_ids = Arc::new(new_set);

        state
            .transactions
            .insert(txn_id, Transaction::new(txn_id, snapshot.clone()));

        (txn_id, snapshot)
    }

    /// Current view of committed work, used to evaluate writes against the latest row versions
    pub async fn latest_view(&self, txn_id: TransactionId) -> Result<Snapshot> {
        let state = self.state.read().await;
        match state.transactions.get(&txn_id) {
            Some(txn) if txn.state().is_active() => Ok(state.view(txn_id.0)),
            Some(txn) => Err(DbError::TransactionError(format!(
                "Transaction {} is {}",
                txn_id,
                txn.state()
            ))),
            None => Err(DbError::TransactionError(format!(
                "Transaction {} not found",
                txn_id
            ))),
        }
    }

    /// View for reads outside any transaction. Tx id 0 is never allocated.
    pub async fn auto_commit_snapshot(&self) -> Snapshot {
        self.state.read().await.view(0)
    }

    pub async fn record_change(&self, txn_id: TransactionId, change: Change) -> Result<()> {
        let mut state = self.state.write().await;
        state.active_mut(txn_id)?.record_change(change)
    }

    pub async fn commit(&self, txn_id: TransactionId) -> Result<TransactionInfo> {
        let mut state = self.state.write().await;
        state.active_mut(txn_id)?.commit()?;

        let info = state
            .transactions
            .remove(&txn_id)
            .map(|txn| TransactionInfo::from(&txn))
            .ok_or_else(|| DbError::TransactionError(format!("Transaction {} not found", txn_id)))?;
        state.deactivate(txn_id);

        Ok(info)
    }

    /// Mark the transaction aborted and hand back its changes.
    ///
    /// The id stays active until `release` so readers keep ignoring its row
    /// versions while the caller reverses them.
    pub async fn abort(&self, txn_id: TransactionId) -> Result<Vec<Change>> {
        let mut state = self.state.write().await;
        state.active_mut(txn_id)?.rollback()
    }

    pub async fn release(&self, txn_id: TransactionId) -> Result<TransactionInfo> {
        let mut state = self.state.write().await;
        let txn = state
            .transactions
            .remove(&txn_id)
            .ok_or_else(|| DbError::TransactionError(format!("Transaction {} not found", txn_id)))?;
        if txn.state() != TransactionState::Aborted {
            let info = TransactionInfo::from(&txn);
            state.transactions.insert(txn_id, txn);
            return Err(DbError::TransactionError(format!(
                "Cannot release transaction {} in state {}",
                txn_id, info.state
            )));
        }
        state.deactivate(txn_id);
        Ok(TransactionInfo::from(&txn))
    }

    /// Oldest transaction id any live snapshot may still treat as in flight.
    ///
    /// A row version deleted by a committed transaction below this horizon is
    /// invisible to every current and future snapshot.
    pub async fn vacuum_horizon(&self) -> u64 {
        let state = self.state.read().await;
        state
            .transactions
            .values()
            .map(|txn| {
                let snapshot = txn.snapshot();
                snapshot
                    .active
                    .iter()
                    .copied()
                    .min()
                    .map_or(snapshot.tx_id, |oldest| oldest.min(snapshot.tx_id))
            })
            .min()
            .unwrap_or(state.next_id)
    }

    pub async fn active_count(&self) -> usize {
        self.state.read().await.active_ids.len()
    }
}

#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub change_count: usize,
    pub duration: Duration,
}

impl From<&Transaction> for TransactionInfo {
    fn from(txn: &Transaction) -> Self {
        Self {
            id: txn.id(),
            state: txn.state(),
            change_count: txn.change_count(),
            duration: txn.duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CarId;

    #[tokio::test]
    async fn test_snapshot_excludes_concurrent_transactions() {
        let manager = TransactionManager::new();

        let (first, _) = manager.begin().await;
        let (second, snapshot) = manager.begin().await;

        assert!(second.as_u64() > first.as_u64());
        assert!(snapshot.active.contains(&first.as_u64()));
        assert!(!snapshot.is_committed(first.as_u64()));

        manager.commit(first).await.unwrap();

        // Repeatable read: the BEGIN snapshot still treats `first` as in flight
        assert!(!snapshot.is_committed(first.as_u64()));

        let latest = manager.latest_view(second).await.unwrap();
        assert!(latest.is_committed(first.as_u64()));
    }

    #[tokio::test]
    async fn test_abort_keeps_id_active_until_release() {
        let manager = TransactionManager::new();
        let (txn, _) = manager.begin().await;

        manager
            .record_change(txn, Change::InsertRow { id: CarId(1) })
            .await
            .unwrap();

        let undo = manager.abort(txn).await.unwrap();
        assert_eq!(undo, vec![Change::InsertRow { id: CarId(1) }]);
        assert_eq!(manager.active_count().await, 1);
        assert!(manager.latest_view(txn).await.is_err());

        let info = manager.release(txn).await.unwrap();
        assert_eq!(info.state, TransactionState::Aborted);
        assert_eq!(manager.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_release_requires_abort() {
        let manager = TransactionManager::new();
        let (txn, _) = manager.begin().await;

        assert!(manager.release(txn).await.is_err());
        // Still registered and active after the refused release
        assert_eq!(manager.active_count().await, 1);
        manager.commit(txn).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_unknown_transaction_fails() {
        let manager = TransactionManager::new();
        let err = manager.commit(TransactionId(42)).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionError(_)));
    }

    #[tokio::test]
    async fn test_vacuum_horizon_tracks_oldest_snapshot() {
        let manager = TransactionManager::new();
        assert_eq!(manager.vacuum_horizon().await, 1);

        let (first, _) = manager.begin().await;
        let (second, _) = manager.begin().await;
        manager.commit(first).await.unwrap();

        // `second` began while `first` was active
        assert_eq!(manager.vacuum_horizon().await, first.as_u64());

        manager.commit(second).await.unwrap();
        assert_eq!(manager.vacuum_horizon().await, second.as_u64() + 1);
    }
}
