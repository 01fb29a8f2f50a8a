//! Per-viewer-context registry of batch coalescers.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use crate::batch::{BatchKey, KeyBatcher};
use crate::entity::Entity;

/// Maps (entity type, key type, field name) to the one [`KeyBatcher`] for
/// that combination, so separate call sites batch similar queries without
/// knowing about each other.
///
/// Scoped to a single [`ViewerContext`](crate::ViewerContext) so that
/// memoized results are never shared across viewers. Entries are created
/// lazily and live as long as the owning context; there is no eviction.
pub struct BatcherRegistry {
    batchers: DashMap<(TypeId, &'static str), Arc<dyn Any + Send + Sync>>,
}

impl BatcherRegistry {
    pub(crate) fn new() -> Self {
        Self {
            batchers: DashMap::new(),
        }
    }

    /// The memoized coalescer for this entity/key/field combination,
    /// constructed via `make` on first access. Idempotent.
    pub fn batcher_for<E, K>(
        &self,
        field: &'static str,
        make: impl FnOnce() -> KeyBatcher<E, K>,
    ) -> Arc<KeyBatcher<E, K>>
    where
        E: Entity,
        K: BatchKey,
    {
        let slot = self
            .batchers
            .entry((TypeId::of::<(E, K)>(), field))
            .or_insert_with(|| Arc::new(make()) as Arc<dyn Any + Send + Sync>);
        let any = Arc::clone(slot.value());
        drop(slot);
        // The map key carries the concrete (E, K) TypeId, so the stored
        // value is always the matching batcher type.
        any.downcast::<KeyBatcher<E, K>>()
            .expect("registry entry keyed by its concrete batcher type")
    }

    /// Number of distinct batchers created so far.
    pub fn len(&self) -> usize {
        self.batchers.len()
    }

    /// Whether no batcher has been created yet.
    pub fn is_empty(&self) -> bool {
        self.batchers.is_empty()
    }
}
