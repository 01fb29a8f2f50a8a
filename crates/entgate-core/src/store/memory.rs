//! In-memory persistence backend.
//!
//! Schemaless row store keyed by entity type name and id, suitable for tests
//! and embedded use. Subquery filters are resolved against the same
//! snapshot the outer statement executes on.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use entgate_ir::{FilterExpr, Projection, ReadQuery, Row, Value, WriteOp, WriteStatement};
use parking_lot::RwLock;

use super::filter::FilterEvaluator;
use super::{Persistence, StoreResult};

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Row>,
}

/// An in-memory [`Persistence`] backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_locked(tables: &HashMap<String, Table>, query: &ReadQuery) -> StoreResult<Vec<Row>> {
        let filter = query
            .filter
            .as_ref()
            .map(|f| Self::resolve_subqueries(tables, f))
            .transpose()?;

        let Some(table) = tables.get(&query.entity) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for row in table.rows.values() {
            let matches = match &filter {
                Some(f) => FilterEvaluator::evaluate(f, row)?,
                None => true,
            };
            if !matches {
                continue;
            }
            out.push(match query.projection {
                Projection::All => row.clone(),
                Projection::IdOnly => {
                    let mut projected = Row::new();
                    if let Some(id) = row.get("id") {
                        projected.set("id", id.clone());
                    }
                    projected
                }
            });
            if query.limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
        }
        Ok(out)
    }

    /// Replace every `InSubquery` node with a plain `In` over the nested
    /// read's id projection, evaluated against the current table state.
    fn resolve_subqueries(
        tables: &HashMap<String, Table>,
        filter: &FilterExpr,
    ) -> StoreResult<FilterExpr> {
        Ok(match filter {
            FilterExpr::InSubquery { field, query } => {
                let rows = Self::read_locked(tables, query)?;
                let values: Vec<Value> = rows
                    .iter()
                    .filter_map(|row| row.get("id").cloned())
                    .collect();
                FilterExpr::In {
                    field: field.clone(),
                    values,
                }
            }
            FilterExpr::And(children) => FilterExpr::And(
                children
                    .iter()
                    .map(|child| Self::resolve_subqueries(tables, child))
                    .collect::<StoreResult<Vec<_>>>()?,
            ),
            FilterExpr::Or(children) => FilterExpr::Or(
                children
                    .iter()
                    .map(|child| Self::resolve_subqueries(tables, child))
                    .collect::<StoreResult<Vec<_>>>()?,
            ),
            other => other.clone(),
        })
    }

    fn matching_ids(
        tables: &HashMap<String, Table>,
        entity: &str,
        filter: Option<&FilterExpr>,
    ) -> StoreResult<Vec<i64>> {
        let resolved = filter
            .map(|f| Self::resolve_subqueries(tables, f))
            .transpose()?;
        let Some(table) = tables.get(entity) else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::new();
        for (id, row) in &table.rows {
            let matches = match &resolved {
                Some(f) => FilterEvaluator::evaluate(f, row)?,
                None => true,
            };
            if matches {
                ids.push(*id);
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn execute_read(&self, query: &ReadQuery) -> StoreResult<Vec<Row>> {
        let tables = self.tables.read();
        Self::read_locked(&tables, query)
    }

    async fn execute_write(&self, statement: &WriteStatement) -> StoreResult<Vec<Row>> {
        let mut tables = self.tables.write();
        match &statement.op {
            WriteOp::Insert { data } => {
                let table = tables.entry(statement.entity.clone()).or_default();
                let id = match data.id() {
                    Some(id) => id,
                    None => table.next_id + 1,
                };
                table.next_id = table.next_id.max(id);
                let mut row = data.clone();
                row.set("id", id);
                table.rows.insert(id, row.clone());
                Ok(vec![row])
            }
            WriteOp::Update { set, filter } => {
                let ids = Self::matching_ids(&tables, &statement.entity, filter.as_ref())?;
                let Some(table) = tables.get_mut(&statement.entity) else {
                    return Ok(Vec::new());
                };
                let mut updated = Vec::new();
                for id in ids {
                    if let Some(row) = table.rows.get_mut(&id) {
                        for (name, value) in set.iter() {
                            // The id is the row's key; it cannot be rewritten.
                            if name != "id" {
                                row.set(name, value.clone());
                            }
                        }
                        updated.push(row.clone());
                    }
                }
                Ok(updated)
            }
            WriteOp::Delete { filter } => {
                let ids = Self::matching_ids(&tables, &statement.entity, filter.as_ref())?;
                let Some(table) = tables.get_mut(&statement.entity) else {
                    return Ok(Vec::new());
                };
                let mut deleted = Vec::new();
                for id in ids {
                    if let Some(row) = table.rows.remove(&id) {
                        deleted.push(row);
                    }
                }
                Ok(deleted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert(store: &MemoryStore, entity: &str, row: Row) -> Row {
        store
            .execute_write(&WriteStatement::insert(entity, row))
            .await
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let a = insert(&store, "note", Row::new().with_field("body", "a")).await;
        let b = insert(&store, "note", Row::new().with_field("body", "b")).await;
        assert_eq!(a.id(), Some(1));
        assert_eq!(b.id(), Some(2));
    }

    #[tokio::test]
    async fn explicit_ids_advance_the_sequence() {
        let store = MemoryStore::new();
        insert(&store, "note", Row::new().with_field("id", 10i64)).await;
        let next = insert(&store, "note", Row::new()).await;
        assert_eq!(next.id(), Some(11));
    }

    #[tokio::test]
    async fn read_applies_filter_projection_and_limit() {
        let store = MemoryStore::new();
        for i in 0..5i64 {
            insert(
                &store,
                "note",
                Row::new().with_field("even", i % 2 == 0),
            )
            .await;
        }

        let evens = store
            .execute_read(&ReadQuery::new("note").with_filter(FilterExpr::eq("even", true)))
            .await
            .unwrap();
        assert_eq!(evens.len(), 3);

        let ids = store
            .execute_read(
                &ReadQuery::new("note")
                    .with_projection(Projection::IdOnly)
                    .with_limit(2),
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].len(), 1);
        assert_eq!(ids[0].id(), Some(1));
    }

    #[tokio::test]
    async fn reading_an_unknown_entity_is_empty_not_an_error() {
        let store = MemoryStore::new();
        let rows = store.execute_read(&ReadQuery::new("ghost")).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn subquery_filters_resolve_at_execution_time() {
        let store = MemoryStore::new();
        insert(&store, "author", Row::new().with_field("active", true)).await;
        insert(&store, "author", Row::new().with_field("active", false)).await;
        insert(&store, "book", Row::new().with_field("author_id", 1i64)).await;
        insert(&store, "book", Row::new().with_field("author_id", 2i64)).await;

        let sub = ReadQuery::new("author")
            .with_filter(FilterExpr::eq("active", true))
            .with_projection(Projection::IdOnly);
        let books = store
            .execute_read(
                &ReadQuery::new("book").with_filter(FilterExpr::in_subquery("author_id", sub)),
            )
            .await
            .unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].get("author_id"), Some(&Value::Int64(1)));
    }

    #[tokio::test]
    async fn update_rewrites_matching_rows_only() {
        let store = MemoryStore::new();
        insert(&store, "note", Row::new().with_field("body", "a")).await;
        insert(&store, "note", Row::new().with_field("body", "b")).await;

        let updated = store
            .execute_write(&WriteStatement::update(
                "note",
                Row::new().with_field("body", "z").with_field("id", 99i64),
                Some(FilterExpr::eq("body", "a")),
            ))
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        // The id stays put even when the payload tries to change it.
        assert_eq!(updated[0].id(), Some(1));
        assert_eq!(updated[0].get("body"), Some(&Value::String("z".into())));
    }

    #[tokio::test]
    async fn delete_returns_the_removed_rows() {
        let store = MemoryStore::new();
        insert(&store, "note", Row::new().with_field("body", "a")).await;
        insert(&store, "note", Row::new().with_field("body", "b")).await;

        let deleted = store
            .execute_write(&WriteStatement::delete(
                "note",
                Some(FilterExpr::eq("body", "b")),
            ))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id(), Some(2));

        let remaining = store.execute_read(&ReadQuery::new("note")).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
