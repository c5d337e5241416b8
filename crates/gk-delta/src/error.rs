use gk_core::{CoreError, Dt, ObjectId};
use gk_sync::SyncError;
use thiserror::Error;

/// Failure reported by a [`Module`](crate::Module) callback.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ModuleError(pub String);

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        ModuleError(message.into())
    }
}

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("module table is full")]
    Capacity,

    #[error("module order names unknown module '{0}'")]
    UnknownModule(String),

    #[error("module '{module}' returned an invalid delta-mode request")]
    InvalidRequest { module: String },

    #[error("module '{module}' failed in {phase}: {source}")]
    Module {
        module: String,
        phase:  &'static str,
        #[source]
        source: ModuleError,
    },

    #[error("delta update failed for {object}")]
    ObjectUpdate { object: ObjectId },

    #[error("lock on {object} failed during delta update")]
    Lock { object: ObjectId },

    #[error("sub-step at {elapsed} still reiterating after {limit} iterations")]
    IterationLimit { limit: u32, elapsed: Dt },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type DeltaResult<T> = Result<T, DeltaError>;
