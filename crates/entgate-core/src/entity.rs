//! The entity trait connecting schema definitions to the core.

use entgate_ir::Row;

use crate::error::Result;
use crate::police::Police;

/// Identifier type for entities. Ids are assigned by the persistence layer.
pub type EntityId = i64;

/// A persisted entity type.
///
/// Implementations supply the type name used by the persistence layer, row
/// mapping, and the access control rules the core enforces on every read and
/// write. In a full deployment these impls are generated from a schema; the
/// core only depends on this trait.
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    /// Entity type name, used as the table/collection name and in error
    /// messages.
    const TYPE_NAME: &'static str;

    /// The entity's id.
    fn id(&self) -> EntityId;

    /// Map a raw store row to a typed entity.
    fn from_row(row: &Row) -> Result<Self>;

    /// Access control rules for this entity type.
    ///
    /// Called with a decision engine bound to the viewer and action being
    /// evaluated. The rules must reach a terminal decision (directly or via
    /// a catch-all step) for every action this entity is exercised under;
    /// omission surfaces as [`Error::NoDecision`](crate::Error::NoDecision)
    /// when the engine is finalized.
    fn access_control_rules(police: Police<Self>) -> Police<Self>;
}
