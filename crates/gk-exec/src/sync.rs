//! Per-step synchronization state and the single-object sync call.
//!
//! Every pass folds its objects into one [`SyncState`].  The fold is
//! associative (min / sum / first) so the bottom-up workers can merge their
//! partials in any grouping and still agree with a single-threaded sweep.

use std::sync::Arc;
use std::time::Instant;

use gk_core::{NextTime, ObjectId, Pass, Timestamp};
use gk_object::{ObjectError, ObjectStore, Service, SyncContext};

use crate::ClassProfile;

/// Why a sync call failed.  Kept cheap to clone so it can travel through the
/// parallel reducer.
#[derive(Clone, Debug)]
pub enum SyncFailure {
    /// A callback returned an error, or the object lock timed out.
    Callback { object: ObjectId, phase: &'static str, error: Arc<ObjectError> },
    /// The object asked for a time before the clock.
    StoppedClock { object: ObjectId, requested: Timestamp },
}

impl SyncFailure {
    pub fn object(&self) -> ObjectId {
        match self {
            SyncFailure::Callback { object, .. } | SyncFailure::StoppedClock { object, .. } => *object,
        }
    }
}

/// Accumulated outcome of the passes of one step.
#[derive(Clone, Debug)]
pub struct SyncState {
    /// Earliest hard next time; `NEVER` if nobody asked for one.
    pub step_to:     Timestamp,
    /// Objects that answered with a hard next time.
    pub hard_events: u32,
    /// An object that asked for the current clock again.
    pub at_clock:    Option<ObjectId>,
    /// First failure, if any.
    pub failure:     Option<SyncFailure>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self { step_to: Timestamp::NEVER, hard_events: 0, at_clock: None, failure: None }
    }
}

impl SyncState {
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    fn failed(failure: SyncFailure) -> Self {
        Self { failure: Some(failure), ..Self::default() }
    }

    /// Fold one object's answer in.
    pub fn record(&mut self, object: ObjectId, next: NextTime, clock: Timestamp) {
        if !next.is_hard() {
            return;
        }
        let t = next.time();
        self.hard_events += 1;
        self.step_to = self.step_to.min(t);
        if t == clock {
            self.at_clock = Some(object);
        }
    }

    /// Associative merge; the left side wins ties on `at_clock` and `failure`.
    pub fn merge(self, other: SyncState) -> SyncState {
        SyncState {
            step_to:     self.step_to.min(other.step_to),
            hard_events: self.hard_events + other.hard_events,
            at_clock:    self.at_clock.or(other.at_clock),
            failure:     self.failure.or(other.failure),
        }
    }
}

/// Synchronize one object for `pass` at `clock`.
///
/// Objects before their in-service time are not called and report the
/// in-service time as a hard event; objects past their out-of-service time
/// report nothing.
pub(crate) fn sync_object(
    store: &ObjectStore,
    profile: &[ClassProfile],
    pass: Pass,
    clock: Timestamp,
    id: ObjectId,
) -> SyncState {
    let entry = match store.get(id) {
        Ok(entry) => entry,
        Err(e) => return callback_failure(id, "lookup", e),
    };

    let mut state = SyncState::default();
    match entry.service_at(clock) {
        Service::Before(in_svc) => {
            state.record(id, NextTime::Hard(in_svc), clock);
            return state;
        }
        Service::After => return state,
        Service::In => {}
    }

    let started = Instant::now();
    let mut guard = match entry.lock(store.lock_stats()) {
        Ok(guard) => guard,
        Err(e) => return callback_failure(id, pass.name(), e),
    };
    let ctx = SyncContext::new(store, id, clock);

    if entry.take_recalc() {
        if let Err(e) = guard.model.recalc(&ctx) {
            return callback_failure(id, "recalc", e);
        }
    }

    let next = match guard.model.sync(pass, clock, &ctx) {
        Ok(next) => next,
        Err(e) => return callback_failure(id, pass.name(), e),
    };
    guard.valid_to = next;
    drop(guard);

    if let Some(p) = profile.get(entry.class().index()) {
        p.record(started.elapsed());
    }

    let requested = next.time();
    if !requested.is_never() && requested < clock {
        return SyncState::failed(SyncFailure::StoppedClock { object: id, requested });
    }
    state.record(id, next, clock);
    state
}

fn callback_failure(object: ObjectId, phase: &'static str, error: ObjectError) -> SyncState {
    SyncState::failed(SyncFailure::Callback { object, phase, error: Arc::new(error) })
}
