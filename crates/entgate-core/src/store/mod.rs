//! The persistence boundary: trait, errors, and the in-memory backend.

use async_trait::async_trait;
use entgate_ir::{ReadQuery, Row, WriteStatement};
use thiserror::Error;

pub mod filter;
pub mod memory;

pub use memory::MemoryStore;

/// Persistence-boundary errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The statement referenced an entity type the backend cannot serve.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// The backend cannot evaluate the given filter shape.
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Backend-specific failure (I/O, connection, etc.).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Abstract persistence interface the core executes against.
///
/// Three capabilities are required: execute a read returning rows for a
/// built filter/projection, execute a write returning affected rows, and
/// evaluate `id IN (nested read)` filters at execution time. Restricted
/// subviews lower to such nested reads and rely on them being re-evaluated
/// when the outer statement runs, not snapshotted earlier.
///
/// Implementations must be thread-safe. Transactions are out of scope; a
/// caller may wrap mutations in one on its side.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    /// Execute a read, returning matching rows.
    async fn execute_read(&self, query: &ReadQuery) -> StoreResult<Vec<Row>>;

    /// Execute a write, returning the affected rows.
    async fn execute_write(&self, statement: &WriteStatement) -> StoreResult<Vec<Row>>;
}
