//! The write-path counterpart of the query abstraction.

use entgate_ir::{FilterExpr, Projection, Row, Value, WriteStatement};
use futures::future::BoxFuture;

use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use crate::police::{Decision, Police, PoliceAction};
use crate::query::EntityQuery;
use crate::viewer::ViewerContext;

/// A callback that narrows which rows a mutation may touch, typically by
/// awaiting a query's resolved ids.
pub type MutatorRestrictor<E> =
    Box<dyn for<'a> FnOnce(&'a mut EntityMutator<E>) -> BoxFuture<'a, Result<()>> + Send>;

/// Creates, updates, and deletes rows of one entity type, enforcing the
/// entity's access control rules for the matching action before any write
/// reaches the store.
///
/// An allow-restricted decision intersects the write's target rows with the
/// authorized subview's id projection; a deny fails the operation with the
/// rule's reason.
///
/// Read-side batch caches for this entity type are stale after a successful
/// mutation: the per-context registry has no invalidation hook, so results
/// memoized earlier in the same request keep their pre-mutation values.
pub struct EntityMutator<E: Entity> {
    vc: ViewerContext,
    /// Filters selecting the rows this mutator targets. Empty targets every
    /// row (before access control narrowing).
    target: Vec<FilterExpr>,
    restrictor: Option<MutatorRestrictor<E>>,
}

impl<E: Entity> EntityMutator<E> {
    /// Create a mutator targeting all rows of the entity type.
    pub fn new(vc: &ViewerContext) -> Self {
        Self {
            vc: vc.clone(),
            target: Vec::new(),
            restrictor: None,
        }
    }

    /// Create a mutator with a graph-view restrictor. The restrictor runs
    /// once, before the first operation executes.
    pub fn with_restrictor(vc: &ViewerContext, restrictor: MutatorRestrictor<E>) -> Self {
        Self {
            vc: vc.clone(),
            target: Vec::new(),
            restrictor: Some(restrictor),
        }
    }

    /// Create a mutator targeting exactly these ids.
    pub fn for_ids(vc: &ViewerContext, ids: &[EntityId]) -> Self {
        let mut mutator = Self::new(vc);
        mutator.restrict_to_ids(ids);
        mutator
    }

    /// The viewer context this mutator runs under.
    pub fn vc(&self) -> &ViewerContext {
        &self.vc
    }

    /// Narrow the target rows to these ids.
    pub fn restrict_to_ids(&mut self, ids: &[EntityId]) {
        self.target.push(FilterExpr::in_values(
            "id",
            ids.iter().map(|id| Value::from(*id)).collect(),
        ));
    }

    /// Create a single entity, subject to the entity's create rules.
    ///
    /// A restricted allow proceeds unrestricted here: a create has no
    /// existing target rows to intersect with a subview.
    pub async fn create(mut self, data: Row) -> Result<E> {
        self.apply_restrictor().await?;
        self.authorize(PoliceAction::Create)?;

        let statement = WriteStatement::insert(E::TYPE_NAME, data);
        let rows = self
            .vc
            .store()
            .execute_write(&statement)
            .await
            .map_err(Error::from)?;
        let row = rows
            .first()
            .ok_or_else(|| Error::Store("insert returned no rows".to_string()))?;
        let entity = E::from_row(row)?;
        tracing::debug!(entity = E::TYPE_NAME, id = entity.id(), "created");
        Ok(entity)
    }

    /// Update the targeted rows, subject to the entity's update rules.
    /// Returns the updated entities.
    pub async fn update(mut self, data: Row) -> Result<Vec<E>> {
        self.apply_restrictor().await?;
        let subview = self.authorize(PoliceAction::Update)?;

        let mut filters = self.target.clone();
        filters.extend(subview);
        let statement = WriteStatement::update(E::TYPE_NAME, data, FilterExpr::conjoin(filters));
        let rows = self
            .vc
            .store()
            .execute_write(&statement)
            .await
            .map_err(Error::from)?;
        tracing::debug!(entity = E::TYPE_NAME, rows = rows.len(), "updated");
        rows.iter().map(E::from_row).collect()
    }

    /// Delete the targeted rows, subject to the entity's delete rules.
    /// Returns the deleted entities.
    pub async fn delete(mut self) -> Result<Vec<E>> {
        self.apply_restrictor().await?;
        let subview = self.authorize(PoliceAction::Delete)?;

        let mut filters = self.target.clone();
        filters.extend(subview);
        let statement = WriteStatement::delete(E::TYPE_NAME, FilterExpr::conjoin(filters));
        let rows = self
            .vc
            .store()
            .execute_write(&statement)
            .await
            .map_err(Error::from)?;
        tracing::debug!(entity = E::TYPE_NAME, rows = rows.len(), "deleted");
        rows.iter().map(E::from_row).collect()
    }

    /// Run the decision engine for `action`. Returns the correlated subview
    /// filter to intersect with the target rows when the decision is
    /// allow-restricted.
    fn authorize(&self, action: PoliceAction) -> Result<Option<FilterExpr>> {
        let base = EntityQuery::unauthorized(&self.vc);
        let police = Police::new(&self.vc, action, base).allow_if_omnipotent();
        let mut police = E::access_control_rules(police);
        match police.finalize()? {
            Decision::AllowUnrestricted => Ok(None),
            Decision::AllowRestricted(subview) => {
                if action == PoliceAction::Create {
                    return Ok(None);
                }
                Ok(Some(FilterExpr::in_subquery(
                    "id",
                    subview.into_read_query(Projection::IdOnly),
                )))
            }
            Decision::Deny(reason) => {
                tracing::debug!(entity = E::TYPE_NAME, %action, %reason, "write denied");
                Err(Error::AccessDenied {
                    entity: E::TYPE_NAME,
                    action,
                    reason,
                })
            }
        }
    }

    async fn apply_restrictor(&mut self) -> Result<()> {
        if let Some(restrictor) = self.restrictor.take() {
            restrictor(self).await?;
        }
        Ok(())
    }
}
