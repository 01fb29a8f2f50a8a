//! Read query IR.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Which fields a read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Projection {
    /// All fields of each matching row.
    #[default]
    All,
    /// Only the `id` field of each matching row.
    IdOnly,
}

/// A filter expression over entity fields.
///
/// `InSubquery` is the correlated-narrowing node: backends must evaluate the
/// nested read at execution time, not snapshot it when the filter is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field not equals value.
    Ne { field: String, value: Value },
    /// Field less than value.
    Lt { field: String, value: Value },
    /// Field less than or equal to value.
    Le { field: String, value: Value },
    /// Field greater than value.
    Gt { field: String, value: Value },
    /// Field greater than or equal to value.
    Ge { field: String, value: Value },
    /// Field is in a set of values.
    In { field: String, values: Vec<Value> },
    /// Field is not in a set of values.
    NotIn { field: String, values: Vec<Value> },
    /// Field is null.
    IsNull { field: String },
    /// Field is not null.
    IsNotNull { field: String },
    /// All conditions must be true.
    And(Vec<FilterExpr>),
    /// At least one condition must be true.
    Or(Vec<FilterExpr>),
    /// Field is in the id projection of a nested read, evaluated when the
    /// outer read executes.
    InSubquery { field: String, query: Box<ReadQuery> },
}

impl FilterExpr {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an IN filter.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            field: field.into(),
            values,
        }
    }

    /// Create a correlated-subquery membership filter.
    pub fn in_subquery(field: impl Into<String>, query: ReadQuery) -> Self {
        FilterExpr::InSubquery {
            field: field.into(),
            query: Box::new(query),
        }
    }

    /// Combine a list of conjuncts into a single expression.
    ///
    /// Returns `None` for an empty list, the sole expression for a single
    /// conjunct, and an `And` node otherwise.
    pub fn conjoin(mut exprs: Vec<FilterExpr>) -> Option<FilterExpr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(FilterExpr::And(exprs)),
        }
    }
}

/// A read against one entity type: filter, projection, optional limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadQuery {
    /// Entity type name to read.
    pub entity: String,
    /// Filter to apply, if any. `None` matches every row.
    pub filter: Option<FilterExpr>,
    /// Fields to return.
    pub projection: Projection,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
}

impl ReadQuery {
    /// Create an unfiltered read of all fields.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
            projection: Projection::All,
            limit: None,
        }
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Set the row limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
