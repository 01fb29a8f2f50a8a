//! Viewer identity and the per-request viewer context.

use std::sync::{Arc, Weak};

use crate::batch::{BatchKey, KeyBatcher};
use crate::entity::Entity;
use crate::registry::BatcherRegistry;
use crate::store::Persistence;

/// The actor performing requests.
///
/// The core treats identity opaquely beyond the authentication and
/// omnipotence predicates; policies may additionally key off the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    /// A viewer that is not logged in.
    Unauthenticated,
    /// An authenticated viewer identified by an opaque subject string.
    Authenticated {
        /// Opaque identity, e.g. a user id.
        subject: String,
    },
    /// Omniscient, omnipotent viewer that bypasses all authorization checks.
    /// **Dangerous!** Use only when necessary.
    Omnipotent,
}

impl Viewer {
    /// Create an authenticated viewer.
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Viewer::Authenticated {
            subject: subject.into(),
        }
    }

    /// Whether this viewer is logged in. Omnipotent viewers count as
    /// authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::Authenticated { .. } | Viewer::Omnipotent)
    }

    /// Whether this viewer bypasses authorization entirely.
    pub fn is_omnipotent(&self) -> bool {
        matches!(self, Viewer::Omnipotent)
    }

    /// The authenticated subject, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Viewer::Authenticated { subject } => Some(subject),
            _ => None,
        }
    }
}

struct ViewerInner {
    viewer: Viewer,
    store: Arc<dyn Persistence>,
    batchers: BatcherRegistry,
}

/// Encapsulates all information for one viewer in one request. Commonly
/// abbreviated to `vc`.
///
/// A new context must be created for each viewer, and a new one should be
/// created for every request: all read-side caching below it (the batcher
/// registry and each batcher's memo) lives exactly as long as the context
/// and is discarded with it. Clones are cheap handles to the same context.
#[derive(Clone)]
pub struct ViewerContext {
    inner: Arc<ViewerInner>,
}

impl ViewerContext {
    /// Create a context for `viewer` backed by `store`.
    pub fn new(viewer: Viewer, store: Arc<dyn Persistence>) -> Self {
        Self {
            inner: Arc::new(ViewerInner {
                viewer,
                store,
                batchers: BatcherRegistry::new(),
            }),
        }
    }

    /// The viewer this context belongs to.
    pub fn viewer(&self) -> &Viewer {
        &self.inner.viewer
    }

    /// Whether the viewer is logged in.
    pub fn is_authenticated(&self) -> bool {
        self.inner.viewer.is_authenticated()
    }

    /// Whether the viewer bypasses authorization.
    pub fn is_omnipotent(&self) -> bool {
        self.inner.viewer.is_omnipotent()
    }

    /// Raw handle to the persistence layer.
    ///
    /// **WARNING:** you probably don't want to use this directly. Reads and
    /// writes issued through it bypass all access control. Use
    /// [`EntityQuery`](crate::EntityQuery), [`EntityLoader`](crate::EntityLoader)
    /// or [`EntityMutator`](crate::EntityMutator) instead.
    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.inner.store
    }

    /// The per-context batcher registry.
    pub fn batchers(&self) -> &BatcherRegistry {
        &self.inner.batchers
    }

    /// The memoized [`KeyBatcher`] for this entity type and filter field,
    /// creating it on first access.
    ///
    /// Independent call sites asking for the same (entity, field) pair share
    /// one coalescer, so their loads issued in the same scheduler turn end
    /// up in one physical query. `key_of` extracts the grouping key from a
    /// loaded entity and is only consulted when the batcher is first built.
    pub fn batcher<E, K>(
        &self,
        field: &'static str,
        key_of: impl Fn(&E) -> K + Send + Sync + 'static,
    ) -> Arc<KeyBatcher<E, K>>
    where
        E: Entity,
        K: BatchKey,
    {
        let weak = self.downgrade();
        self.inner
            .batchers
            .batcher_for(field, move || KeyBatcher::new(weak, field, key_of))
    }

    // Batchers are stored inside the registry this context owns; they hold a
    // weak handle back to the context so the whole graph is freed when the
    // last external clone is dropped.
    pub(crate) fn downgrade(&self) -> WeakViewerContext {
        WeakViewerContext {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak counterpart of [`ViewerContext`], held by batchers.
#[derive(Clone)]
pub(crate) struct WeakViewerContext {
    inner: Weak<ViewerInner>,
}

impl WeakViewerContext {
    pub(crate) fn upgrade(&self) -> Option<ViewerContext> {
        self.inner.upgrade().map(|inner| ViewerContext { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn viewer_predicates() {
        assert!(!Viewer::Unauthenticated.is_authenticated());
        assert!(Viewer::authenticated("u1").is_authenticated());
        assert!(Viewer::Omnipotent.is_authenticated());
        assert!(Viewer::Omnipotent.is_omnipotent());
        assert_eq!(Viewer::authenticated("u1").subject(), Some("u1"));
        assert_eq!(Viewer::Omnipotent.subject(), None);
    }

    #[test]
    fn weak_handle_dies_with_context() {
        let vc = ViewerContext::new(Viewer::Unauthenticated, Arc::new(MemoryStore::new()));
        let weak = vc.downgrade();
        assert!(weak.upgrade().is_some());
        drop(vc);
        assert!(weak.upgrade().is_none());
    }
}
