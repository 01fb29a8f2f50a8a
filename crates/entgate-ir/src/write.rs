//! Write statement IR.

use serde::{Deserialize, Serialize};

use crate::read::FilterExpr;
use crate::row::Row;

/// A write operation against one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Insert a new row. Backends assign the id when the payload omits it.
    Insert {
        /// Field values for the new row.
        data: Row,
    },
    /// Update every row matching the filter.
    Update {
        /// Field values to overwrite.
        set: Row,
        /// Rows to update. `None` matches every row.
        filter: Option<FilterExpr>,
    },
    /// Delete every row matching the filter.
    Delete {
        /// Rows to delete. `None` matches every row.
        filter: Option<FilterExpr>,
    },
}

/// A write statement: the target entity type plus the operation.
///
/// Backends return the affected rows (inserted, updated, or deleted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteStatement {
    /// Entity type name to write.
    pub entity: String,
    /// The operation to perform.
    pub op: WriteOp,
}

impl WriteStatement {
    /// Create an insert statement.
    pub fn insert(entity: impl Into<String>, data: Row) -> Self {
        Self {
            entity: entity.into(),
            op: WriteOp::Insert { data },
        }
    }

    /// Create an update statement.
    pub fn update(entity: impl Into<String>, set: Row, filter: Option<FilterExpr>) -> Self {
        Self {
            entity: entity.into(),
            op: WriteOp::Update { set, filter },
        }
    }

    /// Create a delete statement.
    pub fn delete(entity: impl Into<String>, filter: Option<FilterExpr>) -> Self {
        Self {
            entity: entity.into(),
            op: WriteOp::Delete { filter },
        }
    }
}
