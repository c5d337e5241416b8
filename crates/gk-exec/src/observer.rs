//! Run observer trait for progress reporting and data collection.

use gk_core::{ObjectId, Pass, Timestamp};
use gk_delta::Episode;

use crate::{ExecSummary, SyncState};

/// Callbacks invoked by [`Exec::run`][crate::Exec::run] at key points of the
/// main loop.
///
/// All methods have default no-op implementations so implementors only need to
/// override what they care about.
///
/// # Example: step printer
///
/// ```rust,ignore
/// struct StepPrinter;
///
/// impl ExecObserver for StepPrinter {
///     fn on_step_end(&mut self, clock: Timestamp, next: Timestamp) {
///         println!("{clock} -> {next}");
///     }
/// }
/// ```
pub trait ExecObserver {
    /// Called once after every object's `init` succeeded.
    fn on_init(&mut self, _clock: Timestamp, _objects: usize) {}

    /// Called before each pass sweep, retries included.
    fn on_step_start(&mut self, _clock: Timestamp) {}

    /// Called after each pass with the state accumulated so far this sweep.
    fn on_pass(&mut self, _pass: Pass, _clock: Timestamp, _state: &SyncState) {}

    /// Called when a sweep repeated at `clock` leaves one unit of iteration
    /// budget.  `object` returned the current clock.
    fn on_iteration_warning(&mut self, _clock: Timestamp, _object: Option<ObjectId>) {}

    /// Called after every delta-mode episode.
    fn on_delta_episode(&mut self, _clock: Timestamp, _episode: &Episode) {}

    /// Called after commit, just before the clock moves from `clock` to `next`.
    fn on_step_end(&mut self, _clock: Timestamp, _next: Timestamp) {}

    /// Called once after finalize.
    fn on_run_end(&mut self, _summary: &ExecSummary) {}
}

/// An [`ExecObserver`] that does nothing.
pub struct NoopObserver;

impl ExecObserver for NoopObserver {}
