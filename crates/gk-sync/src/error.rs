use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("lock not acquired after {spins} spins (presumed deadlock)")]
    LockTimeout { spins: u64 },

    #[error("worker {worker} of iterator '{iterator}' panicked")]
    WorkerPanicked { iterator: String, worker: usize },

    #[error("failed to spawn worker for pool '{pool}': {source}")]
    Spawn {
        pool:     String,
        #[source]
        source:   std::io::Error,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;
