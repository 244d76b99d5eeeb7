use crate::core::{Car, CarId, CarRecord, DbError, Result, Snapshot};
use crate::transaction::Change;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct MvccRow {
    pub car: Car,
    pub version: u64,
    pub xmin: u64,         // Transaction ID that created this version
    pub xmax: Option<u64>, // Transaction ID that deleted/superseded this version
}

impl MvccRow {
    fn record(&self, id: CarId) -> CarRecord {
        CarRecord {
            id,
            version: self.version,
            car: self.car.clone(),
        }
    }
}

/// Result of one `delete_where_make` pass.
#[derive(Debug, Default, PartialEq)]
pub struct MakeSweep {
    /// Rows claimed by this pass
    pub claimed: Vec<Change>,
    /// Live transactions holding matching rows this pass could not claim
    pub blocked_by: Vec<u64>,
}

enum RowStatus {
    Writable,
    ClaimedBy(u64),
    Gone,
}

// Status of a row for writer `latest.tx_id`, judged on its newest version.
fn row_status(versions: &[MvccRow], latest: &Snapshot) -> RowStatus {
    let Some(row) = versions.last() else {
        return RowStatus::Gone;
    };
    let live_other = |tx: u64| tx != latest.tx_id && !latest.is_committed(tx);

    if live_other(row.xmin) {
        // A pending update holds the row; a pending insert is not visible to us at all
        return if versions.len() > 1 {
            RowStatus::ClaimedBy(row.xmin)
        } else {
            RowStatus::Gone
        };
    }
    match row.xmax {
        None => RowStatus::Writable,
        Some(tx) if live_other(tx) => RowStatus::ClaimedBy(tx),
        Some(_) => RowStatus::Gone,
    }
}

/// Version chains of every car row, oldest version first.
#[derive(Debug)]
pub struct CarTable {
    rows: BTreeMap<CarId, Vec<MvccRow>>,
    next_row_id: u64,
}

impl Default for CarTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CarTable {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_row_id: 1,
        }
    }

    pub fn insert(&mut self, car: Car, snapshot: &Snapshot) -> Result<CarRecord> {
        car.validate()?;

        let id = CarId(self.next_row_id);
        self.next_row_id += 1;

        let row = MvccRow {
            car,
            version: 0,
            xmin: snapshot.tx_id,
            xmax: None,
        };
        let record = row.record(id);
        self.rows.insert(id, vec![row]);
        Ok(record)
    }

    pub fn get_visible(&self, id: CarId, snapshot: &Snapshot) -> Option<CarRecord> {
        self.rows.get(&id).and_then(|versions| {
            versions
                .iter()
                .rev()
                .find(|version| self.is_visible(version, snapshot))
                .map(|version| version.record(id))
        })
    }

    /// Visible rows with the given make, ascending by id
    pub fn scan_by_make(&self, make: &str, snapshot: &Snapshot) -> Vec<CarRecord> {
        let mut results = Vec::new();
        for (id, versions) in &self.rows {
            for version in versions.iter().rev() {
                if self.is_visible(version, snapshot) {
                    if version.car.make == make {
                        results.push(version.record(*id));
                    }
                    break;
                }
            }
        }
        results
    }

    /// Claim the row for deletion iff its latest version equals `expected_version`.
    ///
    /// Check and claim happen in one call under the caller's write lock.
    pub fn delete_if_version(
        &mut self,
        id: CarId,
        expected_version: u64,
        latest: &Snapshot,
    ) -> Option<Change> {
        let row = self.writable_version(id, latest)?;
        if row.version != expected_version {
            return None;
        }
        row.xmax = Some(latest.tx_id);
        Some(Change::DeleteRow {
            id,
            version: expected_version,
        })
    }

    /// Supersede the row with `car` at `expected_version + 1` iff its latest version matches.
    pub fn update_if_version(
        &mut self,
        id: CarId,
        expected_version: u64,
        car: impl FnOnce(&Car) -> Car,
        latest: &Snapshot,
    ) -> Result<Option<Change>> {
        let Some(row) = self.writable_version(id, latest) else {
            return Ok(None);
        };
        if row.version != expected_version {
            return Ok(None);
        }

        let next = car(&row.car);
        next.validate()?;
        if next.make != row.car.make {
            return Err(DbError::ConstraintViolation(
                "Column 'make' cannot be changed by an update".to_string(),
            ));
        }
        row.xmax = Some(latest.tx_id);

        let new_version = MvccRow {
            car: next,
            version: expected_version + 1,
            xmin: latest.tx_id,
            xmax: None,
        };
        if let Some(versions) = self.rows.get_mut(&id) {
            versions.push(new_version);
        }
        Ok(Some(Change::UpdateRow {
            id,
            from_version: expected_version,
        }))
    }

    /// Claim every current row with the given make, whatever its version.
    ///
    /// Rows another live transaction holds are not claimed; their holders are
    /// returned in `blocked_by` so the caller can wait and run the pass again.
    pub fn delete_where_make(&mut self, make: &str, latest: &Snapshot) -> MakeSweep {
        let mut sweep = MakeSweep::default();
        for (id, versions) in self.rows.iter_mut() {
            let status = row_status(versions, latest);
            let Some(row) = versions.last_mut() else {
                continue;
            };
            if row.car.make != make {
                continue;
            }
            match status {
                RowStatus::Writable => {
                    row.xmax = Some(latest.tx_id);
                    sweep.claimed.push(Change::DeleteRow {
                        id: *id,
                        version: row.version,
                    });
                }
                RowStatus::ClaimedBy(tx) => {
                    if !sweep.blocked_by.contains(&tx) {
                        sweep.blocked_by.push(tx);
                    }
                }
                RowStatus::Gone => {}
            }
        }
        sweep
    }

    /// Reverse everything `tx_id` wrote to the rows named in `changes`.
    pub fn undo(&mut self, tx_id: u64, changes: &[Change]) {
        for change in changes.iter().rev() {
            let id = change.row_id();
            let Some(versions) = self.rows.get_mut(&id) else {
                continue;
            };
            versions.retain(|version| version.xmin != tx_id);
            for version in versions.iter_mut() {
                if version.xmax == Some(tx_id) {
                    version.xmax = None;
                }
            }
            if versions.is_empty() {
                self.rows.remove(&id);
            }
        }
    }

    /// Drop versions superseded or deleted by transactions committed below `horizon`.
    pub fn vacuum(&mut self, horizon: u64, latest: &Snapshot) -> usize {
        let mut purged = 0;
        self.rows.retain(|_, versions| {
            let before = versions.len();
            versions.retain(|version| match version.xmax {
                Some(xmax) => !(xmax < horizon && latest.is_committed(xmax)),
                None => true,
            });
            purged += before - versions.len();
            !versions.is_empty()
        });
        purged
    }

    pub fn version_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    // The newest version, if it is committed (or our own) and not yet claimed by anyone.
    fn writable_version(&mut self, id: CarId, latest: &Snapshot) -> Option<&mut MvccRow> {
        let versions = self.rows.get_mut(&id)?;
        match row_status(versions, latest) {
            RowStatus::Writable => versions.last_mut(),
            RowStatus::ClaimedBy(_) | RowStatus::Gone => None,
        }
    }

    fn is_visible(&self, row: &MvccRow, snapshot: &Snapshot) -> bool {
        if row.xmin == snapshot.tx_id {
            return row.xmax != Some(snapshot.tx_id);
        }

        if !snapshot.is_committed(row.xmin) {
            return false;
        }

        if let Some(xmax) = row.xmax {
            if xmax == snapshot.tx_id {
                return false;
            }
            if snapshot.is_committed(xmax) {
                return false;
            }
        }

        true
    }
}
