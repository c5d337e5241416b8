use std::collections::TryReserveError;

use gk_core::{ObjectId, Timestamp};
use gk_sync::SyncError;
use thiserror::Error;

/// Failures of the rank assignor.  A rejected edge leaves every rank and link
/// as it was before the call.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("{0} cannot be linked to itself")]
    SelfReference(ObjectId),

    #[error("edge {from} -> {to} closes a rank cycle at {object}")]
    Cycle { from: ObjectId, to: ObjectId, object: ObjectId },

    #[error("rank {requested} requested for {object} exceeds the object count {limit}")]
    RankOverflow { object: ObjectId, requested: u32, limit: usize },
}

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("an object named '{0}' already exists")]
    DuplicateName(String),

    #[error("object arena is full")]
    Capacity,

    #[error("{object}: service window [{in_svc}, {out_svc}) is empty")]
    InvalidServiceWindow { object: ObjectId, in_svc: Timestamp, out_svc: Timestamp },

    #[error("{0} tried to access itself through the sync context")]
    SelfAccess(ObjectId),

    #[error("{object} is not a {expected}")]
    TypeMismatch { object: ObjectId, expected: &'static str },

    #[error("lock on {object} failed: {source}")]
    Lock {
        object: ObjectId,
        #[source]
        source: SyncError,
    },

    #[error("could not allocate {what}: {source}")]
    Resource {
        what:   &'static str,
        #[source]
        source: TryReserveError,
    },

    #[error(transparent)]
    Rank(#[from] RankError),

    /// Reported by a model callback.
    #[error("{0}")]
    Model(String),
}

impl ObjectError {
    /// Failure raised from inside an [`ObjectModel`](crate::ObjectModel) callback.
    pub fn model(message: impl Into<String>) -> Self {
        ObjectError::Model(message.into())
    }
}

pub type ObjectResult<T> = Result<T, ObjectError>;
