//! The batched entity loader, the public graph-traversal surface.

use futures::future::BoxFuture;

use crate::entity::{Entity, EntityId};
use crate::error::Result;
use crate::viewer::ViewerContext;

/// A callback that narrows a loader to a subset of the data before it
/// resolves, typically by awaiting a parent loader's results. Used to
/// traverse relationships without joins: a child loader's restrictor awaits
/// the parent's resolved entities and sets the child's id set from them.
pub type LoaderRestrictor<E> =
    Box<dyn for<'a> FnOnce(&'a mut EntityLoader<E>) -> BoxFuture<'a, Result<()>> + Send>;

/// A simple, batching query surface for one entity type.
///
/// Id lookups from every loader of the same entity type within one viewer
/// context share a single [`KeyBatcher`](crate::KeyBatcher), so loads issued
/// in the same scheduler turn coalesce into one physical query. Fewer query
/// methods are available than on [`EntityQuery`](crate::EntityQuery) because
/// most shapes are hard to batch; use a query when batching is not needed.
///
/// Access control rules are enforced by the query each batch flush executes.
pub struct EntityLoader<E: Entity> {
    vc: ViewerContext,
    ids: Vec<EntityId>,
    restrictor: Option<LoaderRestrictor<E>>,
}

impl<E: Entity> EntityLoader<E> {
    /// Create a loader for the viewer.
    pub fn new(vc: &ViewerContext) -> Self {
        Self {
            vc: vc.clone(),
            ids: Vec::new(),
            restrictor: None,
        }
    }

    /// Create a loader with a graph-view restrictor. The restrictor runs
    /// once, when the loader first resolves.
    pub fn with_restrictor(vc: &ViewerContext, restrictor: LoaderRestrictor<E>) -> Self {
        Self {
            vc: vc.clone(),
            ids: Vec::new(),
            restrictor: Some(restrictor),
        }
    }

    /// The viewer context this loader runs under.
    pub fn vc(&self) -> &ViewerContext {
        &self.vc
    }

    /// Set the ids this loader operates on.
    pub fn only_ids(mut self, ids: Vec<EntityId>) -> Self {
        self.set_ids(ids);
        self
    }

    /// Set the single id this loader operates on.
    pub fn only_id(self, id: EntityId) -> Self {
        self.only_ids(vec![id])
    }

    /// The current working id set.
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// Replace the working id set. The `&mut` counterpart of
    /// [`only_ids`](EntityLoader::only_ids), for use inside restrictors.
    pub fn set_ids(&mut self, ids: Vec<EntityId>) {
        self.ids = ids;
    }

    /// If the first working id resolves to an entity, return it.
    ///
    /// The restrictor runs first, so a loader whose ids come entirely from a
    /// parent traversal still resolves. Returns `None` without issuing a
    /// query when the id set is empty after that.
    pub async fn get_one(mut self) -> Result<Option<E>> {
        self.apply_restrictor().await?;
        let Some(&first) = self.ids.first() else {
            return Ok(None);
        };
        self.id_batcher().load_one(first).await
    }

    /// Resolve every working id, in order, isolating per-id failure.
    ///
    /// With no ids set this returns an empty vec and issues no query.
    pub async fn get_all(mut self) -> Result<Vec<Result<Option<E>>>> {
        self.apply_restrictor().await?;
        let ids = std::mem::take(&mut self.ids);
        Ok(self.id_batcher().load_many(ids).await)
    }

    fn id_batcher(&self) -> std::sync::Arc<crate::batch::KeyBatcher<E, EntityId>> {
        self.vc.batcher::<E, EntityId>("id", |entity| entity.id())
    }

    async fn apply_restrictor(&mut self) -> Result<()> {
        if let Some(restrictor) = self.restrictor.take() {
            restrictor(self).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use entgate_ir::{Row, WriteStatement};

    use super::*;
    use crate::error::Error;
    use crate::police::Police;
    use crate::store::memory::MemoryStore;
    use crate::store::Persistence;
    use crate::viewer::Viewer;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: EntityId,
    }

    impl Entity for Note {
        const TYPE_NAME: &'static str = "note";

        fn id(&self) -> EntityId {
            self.id
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.id().ok_or(Error::InvalidRecord {
                    entity: Self::TYPE_NAME,
                    message: "missing id".to_string(),
                })?,
            })
        }

        fn access_control_rules(police: Police<Self>) -> Police<Self> {
            police.allow_all()
        }
    }

    fn vc() -> ViewerContext {
        ViewerContext::new(Viewer::Unauthenticated, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn get_one_applies_the_restrictor_before_resolving() {
        let store = Arc::new(MemoryStore::new());
        store
            .execute_write(&WriteStatement::insert("note", Row::new()))
            .await
            .unwrap();
        let vc = ViewerContext::new(Viewer::Unauthenticated, store);

        // No ids up front: the restrictor supplies them, as a child loader
        // traversing a relationship does.
        let loader = EntityLoader::<Note>::with_restrictor(
            &vc,
            Box::new(|loader| {
                Box::pin(async move {
                    loader.set_ids(vec![1]);
                    Ok(())
                })
            }),
        );
        assert_eq!(loader.get_one().await.unwrap(), Some(Note { id: 1 }));
    }

    #[tokio::test]
    async fn get_one_is_none_when_the_restrictor_leaves_no_ids() {
        let vc = vc();
        let loader = EntityLoader::<Note>::with_restrictor(
            &vc,
            Box::new(|loader| {
                Box::pin(async move {
                    loader.set_ids(Vec::new());
                    Ok(())
                })
            }),
        );
        assert_eq!(loader.get_one().await.unwrap(), None);
        // The empty id set resolves without creating a batcher.
        assert!(vc.batchers().is_empty());
    }

    #[tokio::test]
    async fn get_all_without_ids_is_empty_and_issues_no_query() {
        let vc = vc();
        let results = EntityLoader::<Note>::new(&vc).get_all().await.unwrap();
        assert!(results.is_empty());
    }
}
