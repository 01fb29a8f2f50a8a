//! Filter evaluation against rows.

use std::cmp::Ordering;

use entgate_ir::{FilterExpr, Row, Value};

use super::{StoreError, StoreResult};

/// Evaluates filter expressions against rows.
///
/// `InSubquery` nodes must be resolved into plain `In` filters before
/// evaluation; backends do that against their own data at execution time.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate a filter against a row. Returns `true` if the row matches.
    pub fn evaluate(filter: &FilterExpr, row: &Row) -> StoreResult<bool> {
        match filter {
            FilterExpr::Eq { field, value } => {
                Ok(Self::compare_field(row, field, |v| Self::values_equal(v, value)))
            }
            FilterExpr::Ne { field, value } => {
                Ok(Self::compare_field(row, field, |v| !Self::values_equal(v, value)))
            }
            FilterExpr::Lt { field, value } => Ok(Self::compare_field(row, field, |v| {
                Self::compare_values(v, value).map(Ordering::is_lt).unwrap_or(false)
            })),
            FilterExpr::Le { field, value } => Ok(Self::compare_field(row, field, |v| {
                Self::compare_values(v, value).map(Ordering::is_le).unwrap_or(false)
            })),
            FilterExpr::Gt { field, value } => Ok(Self::compare_field(row, field, |v| {
                Self::compare_values(v, value).map(Ordering::is_gt).unwrap_or(false)
            })),
            FilterExpr::Ge { field, value } => Ok(Self::compare_field(row, field, |v| {
                Self::compare_values(v, value).map(Ordering::is_ge).unwrap_or(false)
            })),
            FilterExpr::In { field, values } => Ok(Self::compare_field(row, field, |v| {
                values.iter().any(|candidate| Self::values_equal(v, candidate))
            })),
            FilterExpr::NotIn { field, values } => Ok(Self::compare_field(row, field, |v| {
                !values.iter().any(|candidate| Self::values_equal(v, candidate))
            })),
            FilterExpr::IsNull { field } => {
                // A missing field reads as null.
                Ok(row.get(field).map(Value::is_null).unwrap_or(true))
            }
            FilterExpr::IsNotNull { field } => {
                Ok(row.get(field).map(|v| !v.is_null()).unwrap_or(false))
            }
            FilterExpr::And(children) => {
                for child in children {
                    if !Self::evaluate(child, row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterExpr::Or(children) => {
                for child in children {
                    if Self::evaluate(child, row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            FilterExpr::InSubquery { .. } => Err(StoreError::UnsupportedFilter(
                "subquery filters must be resolved before row evaluation".to_string(),
            )),
        }
    }

    fn compare_field(row: &Row, field: &str, predicate: impl Fn(&Value) -> bool) -> bool {
        match row.get(field) {
            Some(value) if !value.is_null() => predicate(value),
            _ => false,
        }
    }

    fn values_equal(a: &Value, b: &Value) -> bool {
        a == b
    }

    fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Int64(x), Value::Int64(y)) => Some(x.cmp(y)),
            (Value::Float64(x), Value::Float64(y)) => x.partial_cmp(y),
            (Value::Int64(x), Value::Float64(y)) => (*x as f64).partial_cmp(y),
            (Value::Float64(x), Value::Int64(y)) => x.partial_cmp(&(*y as f64)),
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
            (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
            _ => None,
        }
    }
}
