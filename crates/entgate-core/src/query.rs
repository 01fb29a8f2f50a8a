//! The authorization-aware query abstraction.

use entgate_ir::{FilterExpr, Projection, ReadQuery, Value};
use futures::future::BoxFuture;

use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use crate::mutator::EntityMutator;
use crate::police::{Decision, Police, PoliceAction};
use crate::viewer::ViewerContext;

/// A callback that narrows a query to a subset of the data before it
/// executes, typically by awaiting another query's results. Used to traverse
/// the entity graph without joins.
pub type QueryRestrictor<E> =
    Box<dyn for<'a> FnOnce(&'a mut EntityQuery<E>) -> BoxFuture<'a, Result<()>> + Send>;

/// A query builder and executor for one entity type.
///
/// Construction runs the entity's access control rules for the read action:
/// a deny fails construction immediately, and an allow-restricted decision
/// pins the query to the authorized subview. If query batching is desired,
/// use [`EntityLoader`](crate::EntityLoader) instead; it funnels through
/// this type for enforcement.
pub struct EntityQuery<E: Entity> {
    vc: ViewerContext,
    filters: Vec<FilterExpr>,
    limit: Option<usize>,
    restrictor: Option<QueryRestrictor<E>>,
    /// Authorized subview from an allow-restricted decision. Lowered into a
    /// correlated `id IN (subquery)` filter at execution time so the
    /// narrowing reflects the data as of the outer read, not as of policy
    /// evaluation.
    subview: Option<Box<EntityQuery<E>>>,
}

impl<E: Entity> EntityQuery<E> {
    /// Create a query for the viewer, enforcing access control rules.
    pub fn new(vc: &ViewerContext) -> Result<Self> {
        Self::build(vc, None)
    }

    /// Create a query with a graph-view restrictor, enforcing access control
    /// rules. The restrictor runs once, when the query first executes.
    pub fn with_restrictor(vc: &ViewerContext, restrictor: QueryRestrictor<E>) -> Result<Self> {
        Self::build(vc, Some(restrictor))
    }

    /// Create a query without applying access control rules.
    ///
    /// This is the one deliberate authorization bypass in the crate: it
    /// exists so that restricted subviews (which *are* the authorization
    /// artifact) and mutator internals can be built without recursing into
    /// policy evaluation. It must stay crate-private.
    pub(crate) fn unauthorized(vc: &ViewerContext) -> Self {
        Self {
            vc: vc.clone(),
            filters: Vec::new(),
            limit: None,
            restrictor: None,
            subview: None,
        }
    }

    fn build(vc: &ViewerContext, restrictor: Option<QueryRestrictor<E>>) -> Result<Self> {
        let mut query = Self::unauthorized(vc);
        query.restrictor = restrictor;

        let base = Self::unauthorized(vc);
        let police = Police::new(vc, PoliceAction::Read, base).allow_if_omnipotent();
        let mut police = E::access_control_rules(police);
        match police.finalize()? {
            Decision::AllowUnrestricted => {}
            Decision::AllowRestricted(subview) => {
                query.subview = Some(Box::new(subview));
            }
            Decision::Deny(reason) => {
                tracing::debug!(entity = E::TYPE_NAME, %reason, "read denied");
                return Err(Error::AccessDenied {
                    entity: E::TYPE_NAME,
                    action: PoliceAction::Read,
                    reason,
                });
            }
        }
        Ok(query)
    }

    /// The viewer context this query runs under.
    pub fn vc(&self) -> &ViewerContext {
        &self.vc
    }

    // Filter builders

    /// Restrict to the row with this id.
    pub fn where_id(self, id: EntityId) -> Self {
        self.where_eq("id", id)
    }

    /// Restrict to rows whose id is in `ids`.
    pub fn where_ids_in(self, ids: &[EntityId]) -> Self {
        self.where_in("id", ids.iter().map(|id| Value::from(*id)).collect())
    }

    /// Restrict to rows where `field` equals `value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FilterExpr::eq(field, value));
        self
    }

    /// Restrict to rows where `field` is one of `values`.
    pub fn where_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(FilterExpr::in_values(field, values));
        self
    }

    // Execution

    /// If there is at least one row in the result set, return it.
    pub async fn get_one(mut self) -> Result<Option<E>> {
        self.apply_restrictor().await?;
        self.limit = Some(1);
        let vc = self.vc.clone();
        let read = self.into_read_query(Projection::All);
        let rows = vc.store().execute_read(&read).await.map_err(Error::from)?;
        rows.first().map(E::from_row).transpose()
    }

    /// Return the result set.
    pub async fn get_all(mut self) -> Result<Vec<E>> {
        self.apply_restrictor().await?;
        let vc = self.vc.clone();
        let read = self.into_read_query(Projection::All);
        let rows = vc.store().execute_read(&read).await.map_err(Error::from)?;
        rows.iter().map(E::from_row).collect()
    }

    /// Return the result set's ids.
    pub async fn get_ids(mut self) -> Result<Vec<EntityId>> {
        self.apply_restrictor().await?;
        let vc = self.vc.clone();
        let read = self.into_read_query(Projection::IdOnly);
        let rows = vc.store().execute_read(&read).await.map_err(Error::from)?;
        rows.iter()
            .map(|row| {
                row.id().ok_or(Error::InvalidRecord {
                    entity: E::TYPE_NAME,
                    message: "id projection returned a row without an id".to_string(),
                })
            })
            .collect()
    }

    /// Return a mutator targeting exactly the rows this query resolves to.
    pub fn mutate(self) -> EntityMutator<E> {
        let vc = self.vc.clone();
        EntityMutator::with_restrictor(
            &vc,
            Box::new(move |mutator| {
                Box::pin(async move {
                    let ids = self.get_ids().await?;
                    mutator.restrict_to_ids(&ids);
                    Ok(())
                })
            }),
        )
    }

    async fn apply_restrictor(&mut self) -> Result<()> {
        if let Some(restrictor) = self.restrictor.take() {
            restrictor(self).await?;
        }
        Ok(())
    }

    /// Lower into the backend-facing read. Restricted queries gain a nested
    /// `id IN (subview ids)` filter the backend evaluates at execution time.
    pub(crate) fn into_read_query(self, projection: Projection) -> ReadQuery {
        let mut filters = self.filters;
        if let Some(subview) = self.subview {
            // Subviews are built unauthorized and never carry restrictors.
            debug_assert!(subview.restrictor.is_none());
            filters.push(FilterExpr::in_subquery(
                "id",
                subview.into_read_query(Projection::IdOnly),
            ));
        }
        let mut read = ReadQuery::new(E::TYPE_NAME).with_projection(projection);
        if let Some(filter) = FilterExpr::conjoin(filters) {
            read = read.with_filter(filter);
        }
        if let Some(limit) = self.limit {
            read = read.with_limit(limit);
        }
        read
    }
}
