// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Each Change is recorded while a transaction runs and is reversed in the
// table if the transaction rolls back.
//
// ============================================================================

use crate::core::CarId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A new row was inserted with version 0
    InsertRow { id: CarId },

    /// The row moved from `from_version` to `from_version + 1`
    UpdateRow { id: CarId, from_version: u64 },

    /// The row at `version` was claimed for deletion
    DeleteRow { id: CarId, version: u64 },
}

impl Change {
    pub fn row_id(&self) -> CarId {
        match self {
            Change::InsertRow { id } => *id,
            Change::UpdateRow { id, .. } => *id,
            Change::DeleteRow { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_row_id() {
        let change = Change::UpdateRow {
            id: CarId(3),
            from_version: 1,
        };
        assert_eq!(change.row_id(), CarId(3));

        let delete = Change::DeleteRow {
            id: CarId(4),
            version: 0,
        };
        assert_eq!(delete.row_id(), CarId(4));
    }
}
