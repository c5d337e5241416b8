//! `WorkerPool` — a fixed set of persistent threads fed from a job queue.
//!
//! The pool is spawned once and shared (`Arc`) by every
//! [`ParallelIterator`](crate::ParallelIterator) that fans out work.  An
//! invocation pushes one job per partition and waits for its own batch, so
//! any number of iterators can share the same threads.  Workers never submit
//! jobs themselves.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, trace};

use crate::{SyncError, SyncResult};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs:     VecDeque<Job>,
    shutdown: bool,
}

struct PoolShared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let job = {
            let mut queue = shared.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.shutdown {
                    return;
                }
                queue = shared.ready.wait(queue).unwrap_or_else(PoisonError::into_inner);
            }
        };
        job();
    }
}

/// Persistent worker threads shared by every fan-out of a kernel.
pub struct WorkerPool {
    name:    String,
    shared:  Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers named `{name}-{k}`.  `0` and `1` spawn none;
    /// every iterator on such a pool runs inline on the caller.
    pub fn new(name: impl Into<String>, threads: usize) -> SyncResult<Arc<Self>> {
        let mut pool = Self {
            name:    name.into(),
            shared:  Arc::new(PoolShared {
                queue: Mutex::new(Queue { jobs: VecDeque::new(), shutdown: false }),
                ready: Condvar::new(),
            }),
            workers: Vec::new(),
        };

        if threads > 1 {
            pool.workers.reserve_exact(threads);
            for k in 0..threads {
                let shared = Arc::clone(&pool.shared);
                let handle = std::thread::Builder::new()
                    .name(format!("{}-{k}", pool.name))
                    .spawn(move || worker_loop(shared))
                    .map_err(|source| SyncError::Spawn { pool: pool.name.clone(), source })?;
                pool.workers.push(handle);
            }
        }

        debug!(pool = %pool.name, workers = pool.size(), "worker pool ready");
        Ok(Arc::new(pool))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of spawned worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn is_threaded(&self) -> bool {
        !self.workers.is_empty()
    }

    pub(crate) fn submit(&self, job: Job) {
        self.shared.lock().jobs.push_back(job);
        self.shared.ready.notify_one();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.lock().shutdown = true;
        self.shared.ready.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        trace!(pool = %self.name, "worker pool joined");
    }
}
