//! Delta-mode engine: negotiates entry and runs continuous-time episodes.
//!
//! # Episode
//!
//! ```text
//! negotiate:  min(deltadesired of every module), clamped to the ceiling
//!             Invalid anywhere            → error
//!             all Infinite, no request    → skip
//!             all Infinite, object request → ceiling
//!
//! run:        while elapsed < maximum_time and clock + elapsed <= stop:
//!               timestep = min(negotiated, preupdate of every module)
//!               repeat up to iteration_limit:
//!                 object votes  = update() on every in-service delta object,
//!                                 rank levels low → high, each level fanned out
//!                 module votes  = interupdate() on every module
//!                 vote          = strongest of both
//!                 until vote != Reiterate
//!               elapsed += timestep
//!               Event → stop (after any forced extra sub-steps)
//!             postupdate() on every module
//!             return ceil(elapsed) seconds
//! ```

use std::sync::Arc;
use std::time::Instant;

use gk_core::{DeltaConfig, DeltaStep, Dt, ObjectId, Timestamp, Vote};
use gk_object::{ObjectStore, Service, SyncContext};
use gk_sync::{ParallelIterator, WorkerPool};
use tracing::{debug, error, trace};

use crate::{
    DeltaDesired, DeltaError, DeltaModeContext, DeltaProfile, DeltaResult, ModuleError,
    ModuleRegistry,
};

// ── Object update fan-out ─────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum UpdateFailure {
    /// The object voted `Error`.
    Voted,
    /// The object's lock could not be taken.
    Lock,
}

/// Merged result of one object update fan-out.
#[derive(Copy, Clone, Debug, Default)]
struct UpdateOutcome {
    vote:    Vote,
    /// First failing object in update order.
    failure: Option<(ObjectId, UpdateFailure)>,
}

impl UpdateOutcome {
    fn failed(object: ObjectId, why: UpdateFailure) -> Self {
        Self { vote: Vote::Event, failure: Some((object, why)) }
    }

    fn merge(self, other: Self) -> Self {
        Self { vote: self.vote.merge(other.vote), failure: self.failure.or(other.failure) }
    }
}

fn update_one(store: &ObjectStore, step: &DeltaStep, id: ObjectId) -> UpdateOutcome {
    let Ok(entry) = store.get(id) else {
        return UpdateOutcome::failed(id, UpdateFailure::Voted);
    };
    let now = step.clock.saturating_add(step.elapsed.floor_secs());
    if entry.service_at(now) != Service::In {
        return UpdateOutcome::default();
    }
    let Ok(mut state) = entry.lock(store.lock_stats()) else {
        return UpdateOutcome::failed(id, UpdateFailure::Lock);
    };
    let ctx = SyncContext::new(store, id, step.clock);
    match state.model.update(*step, &ctx) {
        Vote::Error => UpdateOutcome::failed(id, UpdateFailure::Voted),
        vote => UpdateOutcome { vote, failure: None },
    }
}

// ── Episode ───────────────────────────────────────────────────────────────────

/// Why an episode ended.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EpisodeEnd {
    /// Every voter asked for event mode.
    Event,
    /// `maximum_time` of continuous time was covered.
    MaximumTime,
    /// The continuous clock passed the run's stop time.
    StopTime,
}

/// Result of one delta-mode episode.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Episode {
    /// Whole seconds the discrete clock must advance (elapsed, rounded up).
    pub advance:  i64,
    pub elapsed:  Dt,
    pub substeps: u32,
    pub end:      EpisodeEnd,
}

// ── DeltaEngine ───────────────────────────────────────────────────────────────

pub struct DeltaEngine {
    config:   DeltaConfig,
    modules:  ModuleRegistry,
    context:  DeltaModeContext,
    /// One updater per rank level of the delta objects, ascending.
    updaters: Vec<ParallelIterator<ObjectId, DeltaStep, UpdateOutcome>>,
    profile:  DeltaProfile,
}

impl DeltaEngine {
    /// Build the participant lists and the object updaters.
    ///
    /// Call once, after the object graph is final.  Updates fan out on
    /// `pool`, one rank level at a time.
    pub fn new(
        config: DeltaConfig,
        modules: ModuleRegistry,
        store: Arc<ObjectStore>,
        pool: &Arc<WorkerPool>,
        min_items: usize,
    ) -> DeltaResult<Self> {
        config.validate()?;
        let started = Instant::now();
        let context = DeltaModeContext::build(&modules, &store, &config)?;

        let mut updaters = Vec::new();
        for (rank, ids) in context.levels() {
            let shared = Arc::clone(&store);
            let iter = ParallelIterator::builder(format!("delta-r{rank}"), ids.to_vec())
                .pool(pool)
                .min_items(min_items)
                .build(
                    UpdateOutcome::default(),
                    move |step: &DeltaStep, id: &ObjectId| update_one(&shared, step, *id),
                    UpdateOutcome::merge,
                )?;
            updaters.push(iter);
        }

        let profile = DeltaProfile {
            module_list: context
                .modules
                .iter()
                .filter_map(|&id| modules.get(id))
                .map(|m| m.name().to_owned())
                .collect(),
            t_init: started.elapsed(),
            ..DeltaProfile::default()
        };

        Ok(Self { config, modules, context, updaters, profile })
    }

    pub fn context(&self) -> &DeltaModeContext {
        &self.context
    }

    pub fn profile(&self) -> &DeltaProfile {
        &self.profile
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn config(&self) -> &DeltaConfig {
        &self.config
    }

    /// Poll every module for its desired sub-step.
    ///
    /// `Ok(None)` means delta mode is not needed.  `object_request` is set
    /// when an object asked for an episode; it enters at the ceiling even if
    /// every module answered `Infinite`.
    pub fn negotiate(&mut self, clock: Timestamp, object_request: bool) -> DeltaResult<Option<Dt>> {
        if self.context.is_idle() {
            return Ok(None);
        }

        let mut desired: Option<Dt> = None;
        for &id in &self.context.modules {
            let Some(module) = self.modules.get_mut(id) else { continue };
            match module.deltadesired(clock) {
                DeltaDesired::Infinite => {}
                DeltaDesired::Step(dt) if !dt.is_zero() => {
                    desired = Some(desired.map_or(dt, |d| d.min(dt)));
                }
                DeltaDesired::Step(_) | DeltaDesired::Invalid => {
                    error!(module = module.name(), %clock, "invalid delta-mode request");
                    return Err(DeltaError::InvalidRequest { module: module.name().to_owned() });
                }
            }
        }

        let ceiling = self.config.timestep;
        Ok(match desired {
            Some(dt) => Some(dt.min(ceiling)),
            None if object_request => Some(ceiling),
            None => None,
        })
    }

    /// Run one episode starting at discrete time `clock`.
    ///
    /// `stop` is the run's stop time; the episode ends once the continuous
    /// clock passes it.
    pub fn run(&mut self, clock: Timestamp, stop: Timestamp, negotiated: Dt) -> DeltaResult<Episode> {
        let negotiated = if negotiated.is_zero() {
            self.config.timestep
        } else {
            negotiated.min(self.config.timestep)
        };
        let horizon = (!stop.is_never()).then(|| Dt::from_secs_saturating((stop - clock).max(0) as u64));
        let mut forced = self.config.forced_extra_timesteps;
        let mut end = EpisodeEnd::MaximumTime;

        self.profile.episodes += 1;
        self.context.reset();
        debug!(%clock, step = %negotiated, "delta-mode episode started");

        while self.context.elapsed < self.config.maximum_time {
            if horizon.is_some_and(|h| self.context.elapsed > h) {
                end = EpisodeEnd::StopTime;
                break;
            }

            self.context.timestep = self.preupdate(clock, negotiated)?;
            let vote = self.solve_substep(clock)?;

            let timestep = self.context.timestep;
            self.context.elapsed += timestep;
            self.context.substeps += 1;
            self.profile.record_step(timestep);

            match vote {
                Vote::Event if forced == 0 => {
                    end = EpisodeEnd::Event;
                    break;
                }
                Vote::Event => {
                    forced -= 1;
                    trace!(remaining = forced, "forced extra sub-step");
                }
                _ => forced = self.config.forced_extra_timesteps,
            }
        }

        self.postupdate(clock)?;

        let elapsed = self.context.elapsed;
        self.profile.t_delta += elapsed;
        let episode = Episode {
            advance: elapsed.ceil_secs(),
            elapsed,
            substeps: self.context.substeps,
            end,
        };
        debug!(
            %clock,
            %elapsed,
            substeps = episode.substeps,
            advance = episode.advance,
            end = ?episode.end,
            "delta-mode episode finished"
        );
        Ok(episode)
    }

    /// Solve the current sub-step, reiterating while any voter asks to.
    fn solve_substep(&mut self, clock: Timestamp) -> DeltaResult<Vote> {
        let limit = self.config.iteration_limit;
        for iteration in 0..limit {
            self.context.iteration = iteration;
            let step = DeltaStep {
                clock,
                elapsed: self.context.elapsed,
                timestep: self.context.timestep,
                iteration,
            };

            let mut object_vote = self.update_objects(step)?;
            let mut module_vote = self.interupdate(step)?;
            if self.config.forced_always {
                for v in [&mut object_vote, &mut module_vote] {
                    if *v == Vote::Event {
                        *v = Vote::Delta;
                    }
                }
            }

            let vote = object_vote.merge(module_vote);
            if vote != Vote::Reiterate {
                return Ok(vote);
            }
            trace!(iteration, elapsed = %step.elapsed, "sub-step reiterating");
        }

        error!(limit, elapsed = %self.context.elapsed, "delta-mode iteration limit reached");
        Err(DeltaError::IterationLimit { limit, elapsed: self.context.elapsed })
    }

    fn update_objects(&mut self, step: DeltaStep) -> DeltaResult<Vote> {
        if self.updaters.is_empty() {
            return Ok(Vote::Event);
        }
        let started = Instant::now();
        let mut outcome = UpdateOutcome::default();
        for level in &mut self.updaters {
            outcome = outcome.merge(level.run(step)?);
            if outcome.failure.is_some() {
                break;
            }
        }
        self.profile.t_update += started.elapsed();
        self.profile.updates += 1;

        match outcome.failure {
            None => Ok(outcome.vote),
            Some((object, UpdateFailure::Lock)) => {
                error!(%object, "lock failed during delta update");
                Err(DeltaError::Lock { object })
            }
            Some((object, UpdateFailure::Voted)) => {
                error!(%object, elapsed = %step.elapsed, "delta update failed");
                Err(DeltaError::ObjectUpdate { object })
            }
        }
    }

    fn preupdate(&mut self, clock: Timestamp, negotiated: Dt) -> DeltaResult<Dt> {
        let started = Instant::now();
        let elapsed = self.context.elapsed;
        let mut timestep = negotiated;
        for &id in &self.context.modules {
            let Some(module) = self.modules.get_mut(id) else { continue };
            match module.preupdate(clock, elapsed) {
                Ok(dt) if dt.is_zero() => {
                    return Err(module_failure(module.name(), "preupdate", ModuleError::new("zero sub-step")));
                }
                Ok(dt) => timestep = timestep.min(dt),
                Err(source) => return Err(module_failure(module.name(), "preupdate", source)),
            }
        }
        self.profile.t_preupdate += started.elapsed();
        Ok(timestep)
    }

    fn interupdate(&mut self, step: DeltaStep) -> DeltaResult<Vote> {
        let started = Instant::now();
        let mut vote = Vote::Event;
        for &id in &self.context.modules {
            let Some(module) = self.modules.get_mut(id) else { continue };
            match module.interupdate(step) {
                Vote::Error => {
                    return Err(module_failure(module.name(), "interupdate", ModuleError::new("voted error")));
                }
                v => vote = vote.merge(v),
            }
        }
        self.profile.t_interupdate += started.elapsed();
        Ok(vote)
    }

    fn postupdate(&mut self, clock: Timestamp) -> DeltaResult<()> {
        let started = Instant::now();
        let elapsed = self.context.elapsed;
        for &id in &self.context.modules {
            let Some(module) = self.modules.get_mut(id) else { continue };
            module
                .postupdate(clock, elapsed)
                .map_err(|source| module_failure(module.name(), "postupdate", source))?;
        }
        self.profile.t_postupdate += started.elapsed();
        Ok(())
    }
}

fn module_failure(module: &str, phase: &'static str, source: ModuleError) -> DeltaError {
    error!(module, phase, error = %source, "module failed");
    DeltaError::Module { module: module.to_owned(), phase, source }
}
