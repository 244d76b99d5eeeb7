use super::CarTable;
use crate::core::{Car, CarId, CarPatch, CarRecord, DbError, Result, Snapshot};
use crate::interface::CarRepository;
use crate::transaction::{Change, TransactionId, TransactionInfo, TransactionManager};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{Instrument, Level, event, info_span};

struct StoreInner {
    table: RwLock<CarTable>,
    transaction_manager: TransactionManager,
    closed: AtomicBool,
    /// Signalled whenever a transaction finishes or the store closes
    released: Notify,
    /// Waiting transaction id -> ids of the transactions it waits on
    waits_for: Mutex<HashMap<u64, Vec<u64>>>,
}

/// In-memory car store with snapshot-isolated transactions.
///
/// Cloning is cheap; every clone shares the same rows.
#[derive(Clone)]
pub struct CarStore {
    inner: Arc<StoreInner>,
}

impl Default for CarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CarStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                table: RwLock::new(CarTable::new()),
                transaction_manager: TransactionManager::new(),
                closed: AtomicBool::new(false),
                released: Notify::new(),
                waits_for: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open a transaction. Reads inside it see the rows committed before this call.
    pub async fn begin(&self) -> Result<Session> {
        self.ensure_open()?;
        let (txn_id, snapshot) = self.inner.transaction_manager.begin().await;
        event!(Level::TRACE, txn = %txn_id, "transaction started");
        Ok(Session {
            store: self.clone(),
            txn_id,
            snapshot,
            finished: false,
        })
    }

    /// Insert one car in its own transaction
    pub async fn create(&self, car: Car) -> Result<CarRecord> {
        let session = self.begin().await?;
        match session.save(car).await {
            Ok(record) => {
                session.commit().await?;
                Ok(record)
            }
            Err(err) => {
                session.rollback().await?;
                Err(err)
            }
        }
    }

    /// Committed cars with the given make
    pub async fn find_all_by_make(&self, make: &str) -> Result<Vec<CarRecord>> {
        self.ensure_open()?;
        let snapshot = self.inner.transaction_manager.auto_commit_snapshot().await;
        let table = self.inner.table.read().await;
        Ok(table.scan_by_make(make, &snapshot))
    }

    pub async fn count_by_make(&self, make: &str) -> Result<usize> {
        Ok(self.find_all_by_make(make).await?.len())
    }

    /// Purge row versions that no live or future snapshot can see. Returns the number purged.
    pub async fn vacuum(&self) -> Result<usize> {
        self.ensure_open()?;
        let horizon = self.inner.transaction_manager.vacuum_horizon().await;
        let latest = self.inner.transaction_manager.auto_commit_snapshot().await;
        let purged = self.inner.table.write().await.vacuum(horizon, &latest);
        event!(Level::DEBUG, purged = purged as u64, horizon, "vacuum finished");
        Ok(purged)
    }

    /// Every later operation fails with `DbError::StoreClosed`. Open sessions may still roll back.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            event!(Level::INFO, "store closed");
            self.inner.released.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub async fn active_transactions(&self) -> usize {
        self.inner.transaction_manager.active_count().await
    }

    /// Transactions currently waiting for rows held by others
    pub async fn waiting_transactions(&self) -> usize {
        self.inner.waits_for.lock().await.len()
    }

    /// Stored row versions, live or dead
    pub async fn stored_versions(&self) -> usize {
        self.inner.table.read().await.version_count()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DbError::StoreClosed);
        }
        Ok(())
    }

    async fn commit_txn(&self, txn_id: TransactionId) -> Result<TransactionInfo> {
        if self.is_closed() {
            self.rollback_txn(txn_id).await?;
            return Err(DbError::StoreClosed);
        }
        let info = self.inner.transaction_manager.commit(txn_id).await?;
        self.finish_waiting(txn_id).await;
        Ok(info)
    }

    async fn rollback_txn(&self, txn_id: TransactionId) -> Result<TransactionInfo> {
        let changes = self.inner.transaction_manager.abort(txn_id).await?;
        // Still marked active, so readers keep ignoring these versions while they are reversed.
        self.inner.table.write().await.undo(txn_id.as_u64(), &changes);
        let info = self.inner.transaction_manager.release(txn_id).await?;
        self.finish_waiting(txn_id).await;
        Ok(info)
    }

    async fn finish_waiting(&self, txn_id: TransactionId) {
        self.inner.waits_for.lock().await.remove(&txn_id.as_u64());
        self.inner.released.notify_waiters();
    }

    /// Register `waiter` as blocked on `holders`, unless that closes a cycle.
    async fn wait_on(&self, waiter: TransactionId, holders: &[u64]) -> Result<()> {
        let mut waits = self.inner.waits_for.lock().await;
        let cycle = holders
            .iter()
            .copied()
            .find(|&holder| reaches(&waits, holder, waiter.as_u64()));
        if let Some(holder) = cycle {
            waits.remove(&waiter.as_u64());
            return Err(DbError::TransactionError(format!(
                "Deadlock detected: {} waits on {}, which waits on {}",
                waiter,
                TransactionId(holder),
                waiter
            )));
        }
        waits.insert(waiter.as_u64(), holders.to_vec());
        Ok(())
    }

    async fn stop_waiting(&self, waiter: TransactionId) {
        self.inner.waits_for.lock().await.remove(&waiter.as_u64());
    }

    async fn record(&self, txn_id: TransactionId, change: Change) -> Result<()> {
        self.inner
            .transaction_manager
            .record_change(txn_id, change)
            .await
    }

    async fn latest_view(&self, txn_id: TransactionId) -> Result<Snapshot> {
        self.ensure_open()?;
        self.inner.transaction_manager.latest_view(txn_id).await
    }
}

/// One transaction against a `CarStore`.
///
/// Dropping a session without `commit` or `rollback` rolls it back.
pub struct Session {
    store: CarStore,
    txn_id: TransactionId,
    snapshot: Snapshot,
    finished: bool,
}

impl Session {
    pub fn id(&self) -> TransactionId {
        self.txn_id
    }

    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        let info = self.store.commit_txn(self.txn_id).await?;
        event!(
            Level::DEBUG,
            txn = %info.id,
            changes = info.change_count as u64,
            duration_us = info.duration.as_micros() as u64,
            "transaction committed"
        );
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        let info = self.store.rollback_txn(self.txn_id).await?;
        event!(
            Level::DEBUG,
            txn = %info.id,
            duration_us = info.duration.as_micros() as u64,
            "transaction rolled back"
        );
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let store = self.store.clone();
        let txn_id = self.txn_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = store.rollback_txn(txn_id).await {
                        event!(Level::ERROR, txn = %txn_id, error = %err, "implicit rollback failed");
                    }
                });
            }
            Err(_) => {
                event!(Level::WARN, txn = %txn_id, "session dropped outside a runtime; transaction left open");
            }
        }
    }
}

#[async_trait]
impl CarRepository for Session {
    async fn save(&self, car: Car) -> Result<CarRecord> {
        let latest = self.store.latest_view(self.txn_id).await?;
        let record = self.store.inner.table.write().await.insert(car, &latest)?;
        self.store
            .record(self.txn_id, Change::InsertRow { id: record.id })
            .await?;
        event!(Level::TRACE, txn = %self.txn_id, car_id = %record.id, "car inserted");
        Ok(record)
    }

    async fn find_by_id(&self, id: CarId) -> Result<Option<CarRecord>> {
        self.store.ensure_open()?;
        let table = self.store.inner.table.read().await;
        Ok(table.get_visible(id, &self.snapshot))
    }

    async fn find_all_by_make(&self, make: &str) -> Result<Vec<CarRecord>> {
        self.store.ensure_open()?;
        let table = self.store.inner.table.read().await;
        Ok(table.scan_by_make(make, &self.snapshot))
    }

    async fn count_by_make(&self, make: &str) -> Result<usize> {
        Ok(self.find_all_by_make(make).await?.len())
    }

    async fn update(&self, id: CarId, expected_version: u64, patch: CarPatch) -> Result<u64> {
        let latest = self.store.latest_view(self.txn_id).await?;
        let change = self.store.inner.table.write().await.update_if_version(
            id,
            expected_version,
            |car| patch.apply(car),
            &latest,
        )?;
        match change {
            Some(change) => {
                self.store.record(self.txn_id, change).await?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, id: CarId, expected_version: u64) -> Result<u64> {
        let span = info_span!(
            "store.delete",
            txn = %self.txn_id,
            car_id = %id,
            expected_version
        );
        async move {
            let latest = self.store.latest_view(self.txn_id).await?;
            let change = self
                .store
                .inner
                .table
                .write()
                .await
                .delete_if_version(id, expected_version, &latest);
            match change {
                Some(change) => {
                    self.store.record(self.txn_id, change).await?;
                    event!(Level::DEBUG, "row deleted");
                    Ok(1)
                }
                None => {
                    event!(Level::DEBUG, "conditional delete matched no row");
                    Ok(0)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn delete_all_by_make(&self, make: &str) -> Result<u64> {
        let span = info_span!("store.bulk_delete", txn = %self.txn_id, make = %make);
        async move {
            let mut affected = 0;
            loop {
                // Subscribe before looking at the rows so a release in between is not missed
                let released = self.store.inner.released.notified();
                let latest = self.store.latest_view(self.txn_id).await?;
                let sweep = self
                    .store
                    .inner
                    .table
                    .write()
                    .await
                    .delete_where_make(make, &latest);

                affected += sweep.claimed.len() as u64;
                for change in sweep.claimed {
                    self.store.record(self.txn_id, change).await?;
                }
                if sweep.blocked_by.is_empty() {
                    self.store.stop_waiting(self.txn_id).await;
                    break;
                }

                self.store.wait_on(self.txn_id, &sweep.blocked_by).await?;
                event!(
                    Level::DEBUG,
                    waiting_on = ?sweep.blocked_by,
                    "bulk delete waiting for rows held by other transactions"
                );
                released.await;
            }
            event!(Level::DEBUG, affected, "bulk delete finished");
            Ok(affected)
        }
        .instrument(span)
        .await
    }
}

// Whether `target` is reachable from `from` in the waits-for graph.
fn reaches(waits: &HashMap<u64, Vec<u64>>, from: u64, target: u64) -> bool {
    let mut stack = vec![from];
    let mut seen = HashSet::new();
    while let Some(tx) = stack.pop() {
        if tx == target {
            return true;
        }
        if !seen.insert(tx) {
            continue;
        }
        if let Some(next) = waits.get(&tx) {
            stack.extend(next.iter().copied());
        }
    }
    false
}
