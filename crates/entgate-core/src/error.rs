//! Core error types.

use thiserror::Error;

use crate::police::PoliceAction;
use crate::store::StoreError;

/// Core errors.
///
/// The enum is `Clone` because a single failed batch flush fans the same
/// error out to every key that was pending in that flush.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No access control rule reached a terminal decision. A policy author
    /// bug: every rules function must end in a catch-all allow or deny step.
    #[error("no access control decision was made; add a catch-all allow or deny rule")]
    NoDecision,

    /// A decision engine instance was finalized more than once. Instances
    /// are single-use.
    #[error("access control decision engine was already finalized")]
    PoliceReuse,

    /// The viewer was denied by an access control rule. Surfaced to the
    /// caller with the rule's reason; never retried.
    #[error("not allowed to {action} {entity}: {reason}")]
    AccessDenied {
        /// Entity type the viewer was denied on.
        entity: &'static str,
        /// The gated action.
        action: PoliceAction,
        /// Human-readable reason from the denying rule.
        reason: String,
    },

    /// Persistence layer failure. Shared by every key pending in the flush
    /// whose query failed.
    #[error("store error: {0}")]
    Store(String),

    /// A row returned by the store could not be mapped to the entity type.
    #[error("invalid {entity} record: {message}")]
    InvalidRecord {
        /// Entity type being mapped.
        entity: &'static str,
        /// What was wrong with the row.
        message: String,
    },

    /// A pending batch slot was abandoned before its flush completed.
    #[error("batch flush was aborted before resolving this key")]
    FlushAborted,
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
