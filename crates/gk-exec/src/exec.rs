//! The `Exec` main loop.

use std::sync::Arc;
use std::time::Instant;

use gk_core::{KernelClock, KernelConfig, ObjectId, Pass, Timestamp};
use gk_delta::DeltaEngine;
use gk_object::{ClassRegistry, ObjectStore, RankLevels, Service, SyncContext};
use gk_sync::{ParallelIterator, WorkerPool};
use tracing::{debug, error, info, trace, warn};

use crate::sync::sync_object;
use crate::{ExecError, ExecObserver, ExecProfile, ExecResult, StopHandle, SyncFailure, SyncState};

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// What one call to [`Exec::step`] did.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StepEnd {
    /// The clock moved to this time.
    Advanced(Timestamp),
    /// No object reported a hard event and delta mode did not run.
    SteadyState,
    /// The next time is at or past the stop time.
    StopTime,
}

/// Why a run ended.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RunEnd {
    SteadyState,
    StopTime,
    /// A [`StopHandle`] was triggered.
    Stopped,
}

/// Returned by [`Exec::run`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ExecSummary {
    pub final_clock:    Timestamp,
    pub steps:          u64,
    pub passes:         u64,
    pub delta_episodes: u64,
    pub end:            RunEnd,
}

impl ExecSummary {
    pub fn steady_state(&self) -> bool {
        self.end == RunEnd::SteadyState
    }
}

// ── Exec ──────────────────────────────────────────────────────────────────────

/// The scheduling kernel, ready to run.
///
/// Every discrete step runs three passes over the rank levels:
///
/// 1. **PRETOPDOWN**: highest rank first.
/// 2. **BOTTOMUP**: lowest rank first; each level fans out over the
///    kernel's persistent worker pool.
/// 3. **POSTTOPDOWN**: highest rank first.
///
/// The earliest hard next time reported by the sweep is the step target.
/// A target equal to the clock repeats the sweep, charging the iteration
/// budget.  Once it moves forward, delta mode is negotiated, every object
/// commits and the clock advances.
///
/// Create via [`ExecBuilder`][crate::ExecBuilder].
pub struct Exec {
    pub(crate) config:      KernelConfig,
    pub(crate) classes:     ClassRegistry,
    pub(crate) store:       Arc<ObjectStore>,
    /// Indexed by [`Pass::index`].
    pub(crate) levels:      Vec<RankLevels>,
    /// Worker threads shared by the bottom-up levels and the delta engine.
    pub(crate) pool:        Arc<WorkerPool>,
    /// One iterator per non-empty bottom-up level, in ascending rank order.
    pub(crate) bottomup:    Vec<ParallelIterator<ObjectId, Timestamp, SyncState>>,
    pub(crate) delta:       DeltaEngine,
    pub(crate) clock:       KernelClock,
    pub(crate) stop:        StopHandle,
    pub(crate) profile:     ExecProfile,
    pub(crate) initialized: bool,
    pub(crate) episodes:    u64,
}

impl Exec {
    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn clock(&self) -> &KernelClock {
        &self.clock
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn levels(&self, pass: Pass) -> &RankLevels {
        &self.levels[pass.index()]
    }

    pub fn delta(&self) -> &DeltaEngine {
        &self.delta
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn profile(&self) -> &ExecProfile {
        &self.profile
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Run from the current clock until steady state, the stop time or a
    /// stop request, then finalize every object.
    pub fn run<O: ExecObserver>(&mut self, observer: &mut O) -> ExecResult<ExecSummary> {
        let started = Instant::now();
        self.init(observer)?;

        let end = loop {
            if self.stop.is_requested() {
                info!(clock = %self.clock.current, "stop requested");
                break RunEnd::Stopped;
            }
            match self.step(observer)? {
                StepEnd::Advanced(_) => {}
                StepEnd::SteadyState => break RunEnd::SteadyState,
                StepEnd::StopTime => break RunEnd::StopTime,
            }
        };

        self.finalize()?;
        self.profile.t_wall += started.elapsed();

        let summary = ExecSummary {
            final_clock: self.clock.current,
            steps: self.profile.steps,
            passes: self.profile.passes,
            delta_episodes: self.episodes,
            end,
        };
        info!(
            clock = %self.clock,
            steps = summary.steps,
            passes = summary.passes,
            delta_episodes = summary.delta_episodes,
            end = ?summary.end,
            "run finished"
        );
        if self.config.profile {
            self.profile.log(self.store.lock_stats());
            self.delta.profile().log();
        }
        observer.on_run_end(&summary);
        Ok(summary)
    }

    /// Call every object's `init` in creation order.  Runs once; later calls
    /// do nothing.
    pub fn init<O: ExecObserver>(&mut self, observer: &mut O) -> ExecResult<()> {
        if self.initialized {
            return Ok(());
        }
        let started = Instant::now();
        let clock = self.clock.current;

        for entry in self.store.iter() {
            if entry.name().is_none() && self.classes.get(entry.class())?.force_name() {
                warn!(object = %entry.id(), class = %entry.class(), "object of a named class has no name");
            }
            let mut state = entry
                .lock(self.store.lock_stats())
                .map_err(|e| object_failure(entry.label(), "init", e))?;
            state.clock = clock;
            let ctx = SyncContext::new(&self.store, entry.id(), clock);
            state.model.init(&ctx).map_err(|e| object_failure(entry.label(), "init", e))?;
        }

        self.initialized = true;
        self.profile.t_init += started.elapsed();
        debug!(objects = self.store.len(), %clock, "objects initialized");
        observer.on_init(clock, self.store.len());
        Ok(())
    }

    /// Settle the passes at the current clock, run delta mode if anyone asks
    /// for it, commit, and advance the clock.
    pub fn step<O: ExecObserver>(&mut self, observer: &mut O) -> ExecResult<StepEnd> {
        self.init(observer)?;
        let clock = self.clock.current;
        let limit = self.config.iteration_limit;
        let mut budget = limit;

        let state = loop {
            observer.on_step_start(clock);
            let state = self.sweep(clock, observer)?;
            if state.step_to > clock {
                break state;
            }

            budget -= 1;
            let object = state.at_clock.map_or_else(|| "?".to_owned(), |id| self.label(id));
            if budget == 0 {
                error!(%clock, object = %object, limit, "iteration limit reached");
                return Err(ExecError::Convergence { object, clock, limit });
            }
            if budget == 1 {
                debug!(%clock, object = %object, "iteration limit imminent");
                observer.on_iteration_warning(clock, state.at_clock);
            }
            trace!(%clock, object = %object, remaining = budget, "sweep repeated at the same clock");
        };

        let mut next = state.step_to;
        if let Some(advance) = self.delta_mode(clock, observer)? {
            next = clock + advance;
        }

        let floor = self.config.minimum_timestep;
        if floor > 1 && next > clock && !next.is_never() {
            next = next.round_up_to(floor);
        }

        if next.is_never() {
            debug!(%clock, "no hard events left");
            return Ok(StepEnd::SteadyState);
        }
        if self.clock.is_past_stop(next) {
            debug!(%clock, %next, stop = %self.clock.stop, "stop time reached");
            return Ok(StepEnd::StopTime);
        }

        self.commit(clock, next)?;
        observer.on_step_end(clock, next);
        trace!(%clock, %next, hard_events = state.hard_events, "clock advanced");
        self.clock.advance_to(next);
        self.profile.steps += 1;
        Ok(StepEnd::Advanced(next))
    }

    // ── Passes ────────────────────────────────────────────────────────────

    /// Run the three passes once at `clock`.
    fn sweep<O: ExecObserver>(&mut self, clock: Timestamp, observer: &mut O) -> ExecResult<SyncState> {
        let mut total = SyncState::default();
        for pass in Pass::ALL {
            let started = Instant::now();
            let state = match pass {
                Pass::BottomUp => self.bottom_up(clock)?,
                _ => self.top_down(pass, clock),
            };
            self.profile.t_pass[pass.index()] += started.elapsed();

            total = total.merge(state);
            if let Some(failure) = total.failure.take() {
                return Err(self.failure(failure, clock));
            }
            observer.on_pass(pass, clock, &total);
        }
        self.profile.passes += 1;
        Ok(total)
    }

    fn top_down(&self, pass: Pass, clock: Timestamp) -> SyncState {
        let mut state = SyncState::default();
        for (_, level) in self.levels[pass.index()].in_pass_order() {
            for &id in level {
                state = state.merge(sync_object(&self.store, &self.profile.classes, pass, clock, id));
                if !state.is_ok() {
                    return state;
                }
            }
        }
        state
    }

    fn bottom_up(&mut self, clock: Timestamp) -> ExecResult<SyncState> {
        let mut state = SyncState::default();
        for level in &mut self.bottomup {
            state = state.merge(level.run(clock)?);
            if !state.is_ok() {
                break;
            }
        }
        Ok(state)
    }

    // ── Delta mode ────────────────────────────────────────────────────────

    /// Negotiate and run a delta-mode episode.  Returns the whole seconds the
    /// clock must advance, or `None` if no episode ran.
    fn delta_mode<O: ExecObserver>(&mut self, clock: Timestamp, observer: &mut O) -> ExecResult<Option<i64>> {
        let started = Instant::now();
        let request = self.store.take_delta_request();
        let ran = match self.delta.negotiate(clock, request)? {
            Some(step) => {
                let episode = self.delta.run(clock, self.clock.stop, step)?;
                self.episodes += 1;
                observer.on_delta_episode(clock, &episode);
                Some(episode.advance)
            }
            None => None,
        };
        self.profile.t_delta += started.elapsed();
        Ok(ran)
    }

    // ── Commit / finalize ─────────────────────────────────────────────────

    fn commit(&mut self, clock: Timestamp, next: Timestamp) -> ExecResult<()> {
        let started = Instant::now();
        for entry in self.store.iter() {
            if entry.service_at(clock) != Service::In {
                continue;
            }
            let mut state = entry
                .lock(self.store.lock_stats())
                .map_err(|e| object_failure(entry.label(), "commit", e))?;
            state.model.commit(clock, next).map_err(|e| object_failure(entry.label(), "commit", e))?;
            state.clock = next;
        }
        self.profile.t_commit += started.elapsed();
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<()> {
        let started = Instant::now();
        let clock = self.clock.current;
        for entry in self.store.iter() {
            let mut state = entry
                .lock(self.store.lock_stats())
                .map_err(|e| object_failure(entry.label(), "finalize", e))?;
            let ctx = SyncContext::new(&self.store, entry.id(), clock);
            state.model.finalize(&ctx).map_err(|e| object_failure(entry.label(), "finalize", e))?;
        }
        self.profile.t_finalize += started.elapsed();
        Ok(())
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn label(&self, id: ObjectId) -> String {
        self.store.get(id).map_or_else(|_| id.to_string(), |e| e.label())
    }

    fn failure(&self, failure: SyncFailure, clock: Timestamp) -> ExecError {
        let object = self.label(failure.object());
        match failure {
            SyncFailure::Callback { phase, error, .. } => {
                error!(object = %object, phase, %clock, error = %error, "sync failed");
                ExecError::Object { object, phase, source: error }
            }
            SyncFailure::StoppedClock { requested, .. } => {
                error!(object = %object, %requested, %clock, "stopped clock");
                ExecError::StoppedClock { object, requested, clock }
            }
        }
    }
}

fn object_failure(object: String, phase: &'static str, error: gk_object::ObjectError) -> ExecError {
    error!(object = %object, phase, error = %error, "object callback failed");
    ExecError::Object { object, phase, source: Arc::new(error) }
}
