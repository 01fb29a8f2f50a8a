//! The access control decision engine.

use std::fmt;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::query::EntityQuery;
use crate::viewer::ViewerContext;

/// The actions a [`Police`] instance can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoliceAction {
    /// Creating a new entity.
    Create,
    /// Reading entities.
    Read,
    /// Updating existing entities.
    Update,
    /// Deleting existing entities.
    Delete,
}

impl PoliceAction {
    /// Whether this action mutates data.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, PoliceAction::Read)
    }
}

impl fmt::Display for PoliceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoliceAction::Create => "create",
            PoliceAction::Read => "read",
            PoliceAction::Update => "update",
            PoliceAction::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A decision is exactly one of the following:
///
/// 1. `AllowUnrestricted`: allow the viewer to proceed.
/// 2. `AllowRestricted`: allow the viewer to proceed with a restricted view
///    of the data.
/// 3. `Deny`: deny the viewer with a reason.
pub enum Decision<E: Entity> {
    /// Allow the viewer to proceed.
    AllowUnrestricted,
    /// Allow the viewer to proceed against the authorized subview only.
    AllowRestricted(EntityQuery<E>),
    /// Deny the viewer with a human-readable reason.
    Deny(String),
}

impl<E: Entity> fmt::Debug for Decision<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::AllowUnrestricted => f.write_str("AllowUnrestricted"),
            Decision::AllowRestricted(_) => f.write_str("AllowRestricted(..)"),
            Decision::Deny(reason) => f.debug_tuple("Deny").field(reason).finish(),
        }
    }
}

/// Describes and enforces access control rules for one entity type.
///
/// A `Police` authorizes one viewer context's action: allow, allow with a
/// restricted view, or deny a create/read/update/delete of an entity. Rules
/// are a fluent chain of steps evaluated eagerly; the first step that sets a
/// decision wins and every later step is a no-op. The explicit
/// `Option<Decision>` state makes the single-assignment invariant visible:
/// steps only act while the state is undecided.
///
/// An instance is single-use: [`finalize`](Police::finalize) moves the
/// decision out, and calling it again is a loud [`Error::PoliceReuse`].
///
/// Rules are written in [`Entity::access_control_rules`]; the core
/// constructs and finalizes the engine inside [`EntityQuery`] and
/// [`EntityMutator`](crate::EntityMutator).
pub struct Police<E: Entity> {
    vc: ViewerContext,
    action: PoliceAction,
    /// Base query handed to restricted-view builders. Built with access
    /// control application suppressed: it is the authorization artifact
    /// itself and re-authorizing it would recurse without bound.
    base_query: Option<EntityQuery<E>>,
    decision: Option<Decision<E>>,
    finalized: bool,
}

impl<E: Entity> Police<E> {
    /// Construct a new engine deciding whether `vc` may perform `action`.
    ///
    /// `base_query` must be built without access control applied; it is
    /// handed to [`allow_with_restricted_view`](Police::allow_with_restricted_view)
    /// builders as the starting point of the authorized subview.
    pub(crate) fn new(vc: &ViewerContext, action: PoliceAction, base_query: EntityQuery<E>) -> Self {
        Self {
            vc: vc.clone(),
            action,
            base_query: Some(base_query),
            decision: None,
            finalized: false,
        }
    }

    /// The viewer context being authorized.
    pub fn vc(&self) -> &ViewerContext {
        &self.vc
    }

    /// The action this engine is bound to.
    pub fn action(&self) -> PoliceAction {
        self.action
    }

    /// The decision reached so far, if any.
    pub fn decision(&self) -> Option<&Decision<E>> {
        self.decision.as_ref()
    }

    fn decision_made(&self) -> bool {
        self.decision.is_some()
    }

    // Action-specific combinators

    /// Run `rules` only when the engine is bound to the create action.
    pub fn on_create(self, rules: impl FnOnce(Self) -> Self) -> Self {
        self.on_actions(&[PoliceAction::Create], rules)
    }

    /// Run `rules` only when the engine is bound to the read action.
    pub fn on_read(self, rules: impl FnOnce(Self) -> Self) -> Self {
        self.on_actions(&[PoliceAction::Read], rules)
    }

    /// Run `rules` only when the engine is bound to a mutating action.
    pub fn on_create_update_delete(self, rules: impl FnOnce(Self) -> Self) -> Self {
        self.on_actions(
            &[
                PoliceAction::Create,
                PoliceAction::Update,
                PoliceAction::Delete,
            ],
            rules,
        )
    }

    fn on_actions(self, actions: &[PoliceAction], rules: impl FnOnce(Self) -> Self) -> Self {
        if self.decision_made() || !actions.contains(&self.action) {
            return self;
        }
        rules(self)
    }

    // Decision steps

    /// Allow the viewer to proceed if `condition` holds.
    pub fn allow_if(mut self, condition: bool) -> Self {
        if self.decision_made() {
            return self;
        }
        if condition {
            self.decision = Some(Decision::AllowUnrestricted);
        }
        self
    }

    /// Allow omnipotent viewer contexts to do everything.
    pub fn allow_if_omnipotent(self) -> Self {
        let omnipotent = self.vc.is_omnipotent();
        self.allow_if(omnipotent)
    }

    /// Allow the viewer to proceed. Intended as a catch-all case.
    pub fn allow_all(self) -> Self {
        self.allow_if(true)
    }

    /// Deny the viewer with `reason` if `condition` holds.
    pub fn deny_if(mut self, condition: bool, reason: impl Into<String>) -> Self {
        if self.decision_made() {
            return self;
        }
        if condition {
            self.decision = Some(Decision::Deny(reason.into()));
        }
        self
    }

    /// Deny the viewer if it is not authenticated.
    pub fn deny_if_unauthenticated(self) -> Self {
        let unauthenticated = !self.vc.is_authenticated();
        self.deny_if(unauthenticated, "Not logged in.")
    }

    /// Deny the viewer. Intended as a catch-all case.
    pub fn deny_all(self, reason: impl Into<String>) -> Self {
        self.deny_if(true, reason)
    }

    /// Allow the viewer against an authorized part of the graph only.
    ///
    /// `builder` receives the viewer context and the base query and returns
    /// the narrowed subview query. The subview is substituted for the
    /// unrestricted data set wherever the decision is enforced.
    pub fn allow_with_restricted_view(
        mut self,
        builder: impl FnOnce(&ViewerContext, EntityQuery<E>) -> EntityQuery<E>,
    ) -> Self {
        if self.decision_made() {
            return self;
        }
        // The base query is consumed by exactly one restricted decision: a
        // decision is set right below, and every later step is a no-op.
        let base = self
            .base_query
            .take()
            .expect("base query present until the first decision");
        self.decision = Some(Decision::AllowRestricted(builder(&self.vc, base)));
        self
    }

    // Decision state enforcement

    /// Take the decision out of the engine, enforcing that exactly one was
    /// made and that the engine has not been used before.
    ///
    /// Returns [`Error::PoliceReuse`] on every call after the first, and
    /// [`Error::NoDecision`] when no step reached a terminal decision.
    pub fn finalize(&mut self) -> Result<Decision<E>> {
        if self.finalized {
            return Err(Error::PoliceReuse);
        }
        self.finalized = true;
        let decision = self.decision.take().ok_or(Error::NoDecision)?;
        tracing::trace!(
            entity = E::TYPE_NAME,
            action = %self.action,
            decision = ?decision,
            "access control decision"
        );
        Ok(decision)
    }
}
