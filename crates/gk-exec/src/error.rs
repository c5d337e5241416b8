use std::fmt;
use std::sync::Arc;

use gk_core::{CoreError, Timestamp};
use gk_delta::DeltaError;
use gk_object::{ObjectError, RankError};
use gk_sync::SyncError;
use thiserror::Error;

// ── ErrorKind ─────────────────────────────────────────────────────────────────

/// Failure category, each with its own process exit status.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ErrorKind {
    /// Rank cycle, bad edge or malformed object graph.
    Topology,
    /// Iteration budget exhausted or stopped clock.
    Convergence,
    /// Invalid delta-mode answer or failed delta episode.
    Negotiation,
    /// Allocation or worker spawn failure.
    Resource,
    /// Spin-retry budget exhausted.
    Lock,
    /// An object callback reported failure.
    Object,
    /// The configuration was rejected before the run.
    Config,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Topology => 1,
            ErrorKind::Convergence => 2,
            ErrorKind::Negotiation => 3,
            ErrorKind::Resource => 4,
            ErrorKind::Lock => 5,
            ErrorKind::Object => 6,
            ErrorKind::Config => 7,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Topology => "topology",
            ErrorKind::Convergence => "convergence",
            ErrorKind::Negotiation => "negotiation",
            ErrorKind::Resource => "resource",
            ErrorKind::Lock => "lock",
            ErrorKind::Object => "object",
            ErrorKind::Config => "config",
        })
    }
}

// ── ExecError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Config(#[from] CoreError),

    /// Raised while the model was being loaded or indexed.
    #[error("model setup failed: {0}")]
    Setup(#[from] ObjectError),

    #[error("{object}: {phase} failed: {source}")]
    Object {
        object: String,
        phase:  &'static str,
        #[source]
        source: Arc<ObjectError>,
    },

    #[error("{object} asked for {requested}, before the clock {clock} (stopped clock)")]
    StoppedClock { object: String, requested: Timestamp, clock: Timestamp },

    #[error("no convergence at {clock} after {limit} iterations; last object at the clock: {object}")]
    Convergence { object: String, clock: Timestamp, limit: u32 },

    #[error("delta mode: {0}")]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<RankError> for ExecError {
    fn from(e: RankError) -> Self {
        ExecError::Setup(ObjectError::Rank(e))
    }
}

impl ExecError {
    /// Category of the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Config(_) => ErrorKind::Config,
            ExecError::Setup(e) => object_kind(e, ErrorKind::Topology),
            ExecError::Object { source, .. } => object_kind(source, ErrorKind::Object),
            ExecError::StoppedClock { .. } | ExecError::Convergence { .. } => ErrorKind::Convergence,
            ExecError::Delta(e) => match e {
                DeltaError::Lock { .. } => ErrorKind::Lock,
                DeltaError::Sync(e) => sync_kind(e),
                _ => ErrorKind::Negotiation,
            },
            ExecError::Sync(e) => sync_kind(e),
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

fn object_kind(e: &ObjectError, fallback: ErrorKind) -> ErrorKind {
    match e {
        ObjectError::Rank(_) => ErrorKind::Topology,
        ObjectError::Lock { .. } => ErrorKind::Lock,
        ObjectError::Resource { .. } | ObjectError::Capacity => ErrorKind::Resource,
        _ => fallback,
    }
}

fn sync_kind(e: &SyncError) -> ErrorKind {
    match e {
        SyncError::LockTimeout { .. } => ErrorKind::Lock,
        SyncError::Spawn { .. } => ErrorKind::Resource,
        SyncError::WorkerPanicked { .. } => ErrorKind::Object,
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
