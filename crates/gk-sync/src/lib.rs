//! `gk-sync` — concurrency primitives for the rust_gk kernel.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                   |
//! |----------------|------------------------------------------------------------|
//! | [`spinlock`]   | `SpinCounter`, `SpinLock<T>`, `SpinGuard`, `LockStats`     |
//! | [`iterator`]   | `ParallelIterator` — fan-out/fan-in over a fixed item list |
//! | [`pool`]       | `WorkerPool` — persistent threads shared by iterators      |
//! | [`partition`]  | even item partitioning with a per-worker floor             |
//! | [`error`]      | `SyncError`, `SyncResult<T>`                               |
//!
//! # Design notes
//!
//! The spinlock is a single counter per guarded resource: odd means held,
//! release increments.  There is no wait queue and no reader/writer
//! distinction; shared and exclusive acquisition are the same operation.
//! Hold it only around the read or write it guards.
//!
//! Worker threads live in one `WorkerPool`, spawned once and shared by every
//! iterator of a kernel, so the thread count is fixed whatever the number of
//! iterators.  Between invocations the workers park on a condition variable;
//! each invocation queues one job per partition and blocks until every
//! partition has reported back.

pub mod error;
pub mod iterator;
pub mod partition;
pub mod pool;
pub mod spinlock;


pub use error::{SyncError, SyncResult};
pub use iterator::{ParallelIterator, ParallelIteratorBuilder};
pub use partition::partition;
pub use pool::WorkerPool;
pub use spinlock::{LockStats, SpinCounter, SpinGuard, SpinLock};
