//! `ParallelIterator` — fan-out/fan-in over a fixed item list.
//!
//! # Lifecycle
//!
//! ```text
//! build():  partition items, attach to a WorkerPool (shared or private)
//! run(x):   reject(x, last)? ─yes─▶ return last
//!             │no
//!             ▼
//!           push one job per partition with Arc(x) onto the pool
//!           each job folds call(x, item) over its partition
//!           each job stores its partial and counts down the batch
//!           caller waits for the batch, merges partials in partition order
//! ```
//!
//! With a single partition nothing is queued and `run` folds inline on the
//! caller.  Because partials are merged in partition order, any associative
//! `reduce` with a true `identity` gives the same answer for every worker
//! count; a commutative one also tolerates any partition layout.

use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

use crate::{SyncResult, SyncError, WorkerPool, partition};

type CallFn<T, I, R> = dyn Fn(&I, &T) -> R + Send + Sync;
type ReduceFn<R> = dyn Fn(R, R) -> R + Send + Sync;
type RejectFn<I, R> = dyn Fn(&I, &R) -> bool + Send + Sync;

// ── Shared item state ─────────────────────────────────────────────────────────

struct Shared<T, I, R> {
    items:    Arc<[T]>,
    call:     Arc<CallFn<T, I, R>>,
    reduce:   Arc<ReduceFn<R>>,
    identity: R,
}

impl<T, I, R: Clone> Shared<T, I, R> {
    fn fold(&self, input: &I, range: Range<usize>) -> R {
        self.items[range]
            .iter()
            .fold(self.identity.clone(), |acc, item| (self.reduce)(acc, (self.call)(input, item)))
    }
}

// ── Batch ─────────────────────────────────────────────────────────────────────

struct BatchState<R> {
    /// Jobs that have not reported back yet.
    pending:  usize,
    partials: Vec<Option<R>>,
    panicked: Option<usize>,
}

/// Completion barrier of one invocation.
struct Batch<R> {
    state: Mutex<BatchState<R>>,
    done:  Condvar,
}

impl<R> Batch<R> {
    fn new(jobs: usize) -> Self {
        Self {
            state: Mutex::new(BatchState {
                pending:  jobs,
                partials: (0..jobs).map(|_| None).collect(),
                panicked: None,
            }),
            done:  Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BatchState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, index: usize, partial: Option<R>) {
        let mut state = self.lock();
        match partial {
            Some(partial) => state.partials[index] = Some(partial),
            None => {
                state.panicked.get_or_insert(index);
            }
        }
        state.pending -= 1;
        if state.pending == 0 {
            self.done.notify_all();
        }
    }

    fn wait(&self) -> MutexGuard<'_, BatchState<R>> {
        let mut state = self.lock();
        while state.pending > 0 {
            state = self.done.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent builder for [`ParallelIterator`].
pub struct ParallelIteratorBuilder<T, I, R> {
    name:      String,
    items:     Vec<T>,
    threads:   Option<usize>,
    min_items: usize,
    pool:      Option<Arc<WorkerPool>>,
    reject:    Option<Box<RejectFn<I, R>>>,
}

impl<T, I, R> ParallelIteratorBuilder<T, I, R>
where
    T: Send + Sync + 'static,
    I: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Target worker count.  `0` and `1` disable threading.  Defaults to the
    /// size of the attached pool, and never exceeds it.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Minimum items per worker.
    pub fn min_items(mut self, min_items: usize) -> Self {
        self.min_items = min_items;
        self
    }

    /// Run on an existing pool instead of spawning a private one.
    pub fn pool(mut self, pool: &Arc<WorkerPool>) -> Self {
        self.pool = Some(Arc::clone(pool));
        self
    }

    /// Skip an invocation (returning the previous result) when
    /// `reject(input, last_result)` is `true`.  Never consulted on the first
    /// invocation.
    pub fn reject(mut self, reject: impl Fn(&I, &R) -> bool + Send + Sync + 'static) -> Self {
        self.reject = Some(Box::new(reject));
        self
    }

    /// Partition the items and attach them to the pool.
    ///
    /// Without [`pool`](Self::pool), a private pool of `threads` workers is
    /// spawned when the items split into more than one partition.
    ///
    /// `reduce` must be associative with `identity` as its neutral element.
    pub fn build(
        self,
        identity: R,
        call: impl Fn(&I, &T) -> R + Send + Sync + 'static,
        reduce: impl Fn(R, R) -> R + Send + Sync + 'static,
    ) -> SyncResult<ParallelIterator<T, I, R>> {
        let threads = match (&self.pool, self.threads) {
            (Some(pool), Some(threads)) => threads.min(pool.size()),
            (Some(pool), None) => pool.size(),
            (None, threads) => threads.unwrap_or(1),
        };
        let ranges = partition(self.items.len(), threads, self.min_items);

        let pool = match self.pool {
            Some(pool) if ranges.len() > 1 => Some(pool),
            Some(_) => None,
            None if ranges.len() > 1 => Some(WorkerPool::new(self.name.clone(), ranges.len())?),
            None => None,
        };

        let iter = ParallelIterator {
            shared: Arc::new(Shared {
                items: Arc::from(self.items),
                call: Arc::new(call),
                reduce: Arc::new(reduce),
                identity,
            }),
            name: self.name,
            ranges,
            pool,
            reject: self.reject,
            last: None,
            runs: 0,
            rejected: 0,
        };

        debug!(
            iterator = %iter.name,
            items = iter.shared.items.len(),
            workers = iter.worker_count(),
            pool = iter.pool.as_ref().map(|p| p.name()),
            "parallel iterator ready"
        );
        Ok(iter)
    }
}

// ── ParallelIterator ──────────────────────────────────────────────────────────

/// A fixed item list processed by persistent workers.
///
/// `T` is the work item, `I` the per-invocation input shared by all workers,
/// `R` the per-item result and merge type.
pub struct ParallelIterator<T, I, R> {
    name:     String,
    shared:   Arc<Shared<T, I, R>>,
    ranges:   Vec<Range<usize>>,
    /// `None` when running inline.
    pool:     Option<Arc<WorkerPool>>,
    reject:   Option<Box<RejectFn<I, R>>>,
    last:     Option<R>,
    runs:     u64,
    rejected: u64,
}

impl<T, I, R> ParallelIterator<T, I, R>
where
    T: Send + Sync + 'static,
    I: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Start building an iterator named `name` over `items`.
    pub fn builder(name: impl Into<String>, items: Vec<T>) -> ParallelIteratorBuilder<T, I, R> {
        ParallelIteratorBuilder {
            name: name.into(),
            items,
            threads: None,
            min_items: 1,
            pool: None,
            reject: None,
        }
    }

    /// Process every item with `input` and return the merged result.
    pub fn run(&mut self, input: I) -> SyncResult<R> {
        if let (Some(reject), Some(last)) = (&self.reject, &self.last) {
            if reject(&input, last) {
                self.rejected += 1;
                return Ok(last.clone());
            }
        }

        let result = match &self.pool {
            None => {
                let shared = &self.shared;
                let all = 0..shared.items.len();
                catch_unwind(AssertUnwindSafe(|| shared.fold(&input, all))).map_err(|_| {
                    error!(iterator = %self.name, "inline worker panicked");
                    SyncError::WorkerPanicked { iterator: self.name.clone(), worker: 0 }
                })?
            }
            Some(pool) => self.run_threaded(pool, Arc::new(input))?,
        };

        self.runs += 1;
        self.last = Some(result.clone());
        Ok(result)
    }

    fn run_threaded(&self, pool: &WorkerPool, input: Arc<I>) -> SyncResult<R> {
        let batch = Arc::new(Batch::new(self.ranges.len()));
        for (index, range) in self.ranges.iter().cloned().enumerate() {
            let shared = Arc::clone(&self.shared);
            let input = Arc::clone(&input);
            let batch = Arc::clone(&batch);
            pool.submit(Box::new(move || {
                let partial = catch_unwind(AssertUnwindSafe(|| shared.fold(&input, range))).ok();
                batch.finish(index, partial);
            }));
        }

        let mut state = batch.wait();
        if let Some(worker) = state.panicked {
            error!(iterator = %self.name, worker, "worker panicked");
            return Err(SyncError::WorkerPanicked { iterator: self.name.clone(), worker });
        }

        let shared = &self.shared;
        let merged = state
            .partials
            .iter_mut()
            .filter_map(Option::take)
            .fold(shared.identity.clone(), |acc, p| (shared.reduce)(acc, p));
        Ok(merged)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of items processed per invocation.
    pub fn len(&self) -> usize {
        self.shared.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.items.is_empty()
    }

    /// The fixed work items.
    pub fn items(&self) -> &[T] {
        &self.shared.items
    }

    /// Number of partitions (1 when running inline).
    pub fn worker_count(&self) -> usize {
        self.ranges.len()
    }

    /// `true` if invocations are fanned out to pool threads.
    pub fn is_threaded(&self) -> bool {
        self.pool.is_some()
    }

    /// The pool invocations run on, if threaded.
    pub fn pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref()
    }

    /// Result of the most recent invocation.
    pub fn last(&self) -> Option<&R> {
        self.last.as_ref()
    }

    /// Invocations that actually ran (rejected ones excluded).
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Invocations answered from the cache by the reject predicate.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
