//! Entgate core - viewer-scoped entity loading with batched reads and
//! policy-gated access.
//!
//! Every read and write flows through two request-scoped mechanisms:
//!
//! - the [`Police`] decision engine authorizes the viewer's action before a
//!   statement reaches the store, and can narrow the visible data to an
//!   authorized subview instead of a plain allow/deny;
//! - the [`KeyBatcher`] coalescer turns lookups issued in the same scheduler
//!   turn into one physical query per (entity type, field) pair.
//!
//! Both are owned by a [`ViewerContext`], created per request and discarded
//! with it, which is what bounds every cache in this crate.

pub mod batch;
pub mod entity;
pub mod error;
pub mod loader;
pub mod mutator;
pub mod police;
pub mod query;
pub mod registry;
pub mod store;
pub mod viewer;

pub use batch::{BatchKey, KeyBatcher};
pub use entity::{Entity, EntityId};
pub use error::{Error, Result};
pub use loader::{EntityLoader, LoaderRestrictor};
pub use mutator::{EntityMutator, MutatorRestrictor};
pub use police::{Decision, Police, PoliceAction};
pub use query::{EntityQuery, QueryRestrictor};
pub use registry::BatcherRegistry;
pub use store::{MemoryStore, Persistence, StoreError};
pub use viewer::{Viewer, ViewerContext};

/// Re-export of the query/mutation IR.
pub use entgate_ir as ir;
