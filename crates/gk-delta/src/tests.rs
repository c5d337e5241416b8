//! Unit tests for gk-delta.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gk_core::{ClassId, DeltaConfig, DeltaStep, Dt, NextTime, ObjectId, Pass, Timestamp, Vote};
use gk_object::{ObjectModel, ObjectResult, ObjectStore, SyncContext};
use gk_sync::WorkerPool;

use crate::{
    DeltaDesired, DeltaEngine, DeltaError, EpisodeEnd, Module, ModuleError, ModuleRegistry,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

type CallLog = Arc<Mutex<Vec<String>>>;

/// Module with canned answers.  Interupdate votes are consumed in order and
/// default to `Event` once exhausted.
struct Scripted {
    name:    &'static str,
    desired: DeltaDesired,
    pre:     Result<Dt, ModuleError>,
    votes:   VecDeque<Vote>,
    post_ok: bool,
    log:     CallLog,
}

impl Scripted {
    fn new(name: &'static str, desired: DeltaDesired, log: &CallLog) -> Self {
        Self {
            name,
            desired,
            pre: Ok(Dt(u64::MAX)),
            votes: VecDeque::new(),
            post_ok: true,
            log: Arc::clone(log),
        }
    }

    fn votes(mut self, votes: &[Vote]) -> Self {
        self.votes = votes.iter().copied().collect();
        self
    }

    fn pre(mut self, pre: Result<Dt, ModuleError>) -> Self {
        self.pre = pre;
        self
    }

    fn record(&self, phase: &str) {
        self.log.lock().unwrap().push(format!("{}:{phase}", self.name));
    }
}

impl Module for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn deltadesired(&mut self, _clock: Timestamp) -> DeltaDesired {
        self.record("desired");
        self.desired
    }

    fn preupdate(&mut self, _clock: Timestamp, _elapsed: Dt) -> Result<Dt, ModuleError> {
        self.record("pre");
        self.pre.clone()
    }

    fn interupdate(&mut self, _step: DeltaStep) -> Vote {
        self.record("inter");
        self.votes.pop_front().unwrap_or(Vote::Event)
    }

    fn postupdate(&mut self, _clock: Timestamp, _elapsed: Dt) -> Result<(), ModuleError> {
        self.record("post");
        if self.post_ok { Ok(()) } else { Err(ModuleError::new("post failed")) }
    }
}

/// Object with canned update votes; counts its updates.
#[derive(Default)]
struct Voter {
    votes:   VecDeque<Vote>,
    updates: u32,
    steps:   Vec<DeltaStep>,
}

impl ObjectModel for Voter {
    fn sync(&mut self, _pass: Pass, _t: Timestamp, _ctx: &SyncContext<'_>) -> ObjectResult<NextTime> {
        Ok(NextTime::Never)
    }

    fn update(&mut self, step: DeltaStep, _ctx: &SyncContext<'_>) -> Vote {
        self.updates += 1;
        self.steps.push(step);
        self.votes.pop_front().unwrap_or(Vote::Event)
    }
}

fn voter(votes: &[Vote]) -> Box<Voter> {
    Box::new(Voter { votes: votes.iter().copied().collect(), ..Voter::default() })
}

/// A store whose objects are all delta-mode voters.
fn delta_store(scripts: &[&[Vote]]) -> (Arc<ObjectStore>, Vec<ObjectId>) {
    let mut store = ObjectStore::default();
    let ids = scripts
        .iter()
        .map(|votes| {
            let id = store.insert(ClassId(0), None, voter(votes)).unwrap();
            store.enable_delta_mode(id).unwrap();
            id
        })
        .collect();
    (Arc::new(store), ids)
}

fn config() -> DeltaConfig {
    DeltaConfig { timestep: Dt::from_millis(10), ..DeltaConfig::default() }
}

fn engine(config: DeltaConfig, modules: ModuleRegistry, store: &Arc<ObjectStore>) -> DeltaEngine {
    let pool = WorkerPool::new("delta-test", 1).unwrap();
    DeltaEngine::new(config, modules, Arc::clone(store), &pool, 1).unwrap()
}

/// Delta object that logs its label on every update, after an optional delay.
struct Ordered {
    label: String,
    delay: Duration,
    log:   CallLog,
}

impl ObjectModel for Ordered {
    fn sync(&mut self, _pass: Pass, _t: Timestamp, _ctx: &SyncContext<'_>) -> ObjectResult<NextTime> {
        Ok(NextTime::Never)
    }

    fn update(&mut self, _step: DeltaStep, _ctx: &SyncContext<'_>) -> Vote {
        std::thread::sleep(self.delay);
        self.log.lock().unwrap().push(self.label.clone());
        Vote::Event
    }
}

fn updates_of(store: &ObjectStore, id: ObjectId) -> u32 {
    store.read::<Voter, _>(id, |v| v.updates).unwrap()
}

fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod registry {
    use super::*;

    #[test]
    fn duplicate_name_rejected() {
        let log = new_log();
        let mut modules = ModuleRegistry::new();
        modules.register(Scripted::new("powerflow", DeltaDesired::Infinite, &log)).unwrap();
        let err = modules.register(Scripted::new("powerflow", DeltaDesired::Infinite, &log)).unwrap_err();
        assert!(matches!(err, DeltaError::DuplicateModule(ref n) if n == "powerflow"));
    }

    #[test]
    fn override_first_then_natural_order() {
        let log = new_log();
        let mut modules = ModuleRegistry::new();
        let a = modules.register(Scripted::new("a", DeltaDesired::Infinite, &log)).unwrap();
        let b = modules.register(Scripted::new("b", DeltaDesired::Infinite, &log)).unwrap();
        let c = modules.register(Scripted::new("c", DeltaDesired::Infinite, &log)).unwrap();

        assert_eq!(modules.update_order(&[]).unwrap(), vec![a, b, c]);
        let preferred = vec!["c".to_owned(), "a".to_owned(), "c".to_owned()];
        assert_eq!(modules.update_order(&preferred).unwrap(), vec![c, a, b]);
        assert!(matches!(
            modules.update_order(&["zzz".to_owned()]),
            Err(DeltaError::UnknownModule(_))
        ));
    }

    #[test]
    fn engine_calls_modules_in_update_order() {
        let log = new_log();
        let mut modules = ModuleRegistry::new();
        modules.register(Scripted::new("a", DeltaDesired::Step(Dt::from_millis(5)), &log)).unwrap();
        modules.register(Scripted::new("b", DeltaDesired::Infinite, &log)).unwrap();
        let cfg = DeltaConfig { module_order: vec!["b".to_owned()], ..config() };
        let (store, _) = delta_store(&[]);
        let mut eng = engine(cfg, modules, &store);

        assert_eq!(eng.profile().module_list, vec!["b".to_owned(), "a".to_owned()]);
        let step = eng.negotiate(Timestamp(0), false).unwrap().unwrap();
        eng.run(Timestamp(0), Timestamp::NEVER, step).unwrap();
        let calls = log.lock().unwrap().clone();
        assert_eq!(
            calls,
            ["b:desired", "a:desired", "b:pre", "a:pre", "b:inter", "a:inter", "b:post", "a:post"]
        );
    }
}

// ── Negotiation ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod negotiation {
    use super::*;

    fn negotiate(answers: &[DeltaDesired], object_request: bool) -> Result<Option<Dt>, DeltaError> {
        let log = new_log();
        let names = ["m0", "m1", "m2", "m3"];
        let mut modules = ModuleRegistry::new();
        for (name, &answer) in names.iter().zip(answers) {
            modules.register(Scripted::new(name, answer, &log)).unwrap();
        }
        let (store, _) = delta_store(&[&[]]);
        engine(config(), modules, &store).negotiate(Timestamp(60), object_request)
    }

    #[test]
    fn all_infinite_skips_the_engine() {
        let answers = [DeltaDesired::Infinite, DeltaDesired::Infinite];
        assert_eq!(negotiate(&answers, false).unwrap(), None);
    }

    #[test]
    fn minimum_step_wins() {
        let answers = [
            DeltaDesired::Step(Dt::from_millis(5)),
            DeltaDesired::Infinite,
            DeltaDesired::Step(Dt::from_millis(2)),
        ];
        assert_eq!(negotiate(&answers, false).unwrap(), Some(Dt::from_millis(2)));
    }

    #[test]
    fn clamped_to_ceiling() {
        let answers = [DeltaDesired::Step(Dt::from_secs(1))];
        assert_eq!(negotiate(&answers, false).unwrap(), Some(Dt::from_millis(10)));
    }

    #[test]
    fn invalid_is_fatal() {
        let answers = [DeltaDesired::Step(Dt::from_millis(5)), DeltaDesired::Invalid];
        assert!(matches!(
            negotiate(&answers, false),
            Err(DeltaError::InvalidRequest { ref module }) if module == "m1"
        ));
        let zero = [DeltaDesired::Step(Dt::ZERO)];
        assert!(matches!(negotiate(&zero, false), Err(DeltaError::InvalidRequest { .. })));
    }

    #[test]
    fn object_request_enters_at_ceiling() {
        let answers = [DeltaDesired::Infinite];
        assert_eq!(negotiate(&answers, true).unwrap(), Some(Dt::from_millis(10)));
        // No modules at all, but a delta object asked.
        assert_eq!(negotiate(&[], true).unwrap(), Some(Dt::from_millis(10)));
    }

    #[test]
    fn idle_engine_never_enters() {
        let (store, _) = delta_store(&[]);
        let mut eng = engine(config(), ModuleRegistry::new(), &store);
        assert!(eng.context().is_idle());
        assert_eq!(eng.negotiate(Timestamp(0), true).unwrap(), None);
    }
}

// ── Episodes ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod episodes {
    use super::*;

    #[test]
    fn event_on_first_substep_consumes_one_step() {
        let (store, ids) = delta_store(&[&[]]);
        let mut eng = engine(config(), ModuleRegistry::new(), &store);
        let ep = eng.run(Timestamp(100), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        assert_eq!(ep.substeps, 1);
        assert_eq!(ep.elapsed, Dt::from_millis(10));
        assert_eq!(ep.advance, 1);
        assert_eq!(ep.end, EpisodeEnd::Event);
        assert_eq!(updates_of(&store, ids[0]), 1);
    }

    #[test]
    fn delta_votes_keep_the_episode_going() {
        let (store, ids) = delta_store(&[&[Vote::Delta, Vote::Delta], &[Vote::Event]]);
        let mut eng = engine(config(), ModuleRegistry::new(), &store);
        let ep = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        assert_eq!(ep.substeps, 3);
        assert_eq!(ep.elapsed, Dt::from_millis(30));
        assert_eq!(ep.advance, 1);
        assert_eq!(updates_of(&store, ids[1]), 3);

        let steps = store.read::<Voter, _>(ids[0], |v| v.steps.clone()).unwrap();
        let elapsed: Vec<Dt> = steps.iter().map(|s| s.elapsed).collect();
        assert_eq!(elapsed, vec![Dt::ZERO, Dt::from_millis(10), Dt::from_millis(20)]);
    }

    #[test]
    fn reiterate_repeats_the_same_substep() {
        let log = new_log();
        let mut modules = ModuleRegistry::new();
        modules
            .register(
                Scripted::new("solver", DeltaDesired::Step(Dt::from_millis(10)), &log)
                    .votes(&[Vote::Reiterate, Vote::Reiterate, Vote::Event]),
            )
            .unwrap();
        let (store, ids) = delta_store(&[&[]]);
        let mut eng = engine(config(), modules, &store);
        let ep = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap();

        assert_eq!(ep.substeps, 1);
        let steps = store.read::<Voter, _>(ids[0], |v| v.steps.clone()).unwrap();
        assert_eq!(steps.iter().map(|s| s.iteration).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(steps.iter().all(|s| s.elapsed == Dt::ZERO));
        assert_eq!(eng.profile().updates, 3);
    }

    #[test]
    fn endless_reiteration_hits_the_limit() {
        let (store, _) = delta_store(&[&[Vote::Reiterate; 10]]);
        let cfg = DeltaConfig { iteration_limit: 3, ..config() };
        let mut eng = engine(cfg, ModuleRegistry::new(), &store);
        let err = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap_err();
        assert!(matches!(err, DeltaError::IterationLimit { limit: 3, .. }));
    }

    #[test]
    fn object_error_names_the_object() {
        let (store, ids) = delta_store(&[&[], &[Vote::Error]]);
        let mut eng = engine(config(), ModuleRegistry::new(), &store);
        let err = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap_err();
        assert!(matches!(err, DeltaError::ObjectUpdate { object } if object == ids[1]));
    }

    #[test]
    fn module_failures_are_fatal() {
        let log = new_log();
        let mut modules = ModuleRegistry::new();
        modules
            .register(Scripted::new("m", DeltaDesired::Infinite, &log).pre(Ok(Dt::ZERO)))
            .unwrap();
        let (store, _) = delta_store(&[]);
        let mut eng = engine(config(), modules, &store);
        let err = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap_err();
        assert!(matches!(err, DeltaError::Module { phase: "preupdate", .. }));

        let mut modules = ModuleRegistry::new();
        modules
            .register(Scripted::new("m", DeltaDesired::Infinite, &log).votes(&[Vote::Error]))
            .unwrap();
        let mut eng = engine(config(), modules, &store);
        let err = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap_err();
        assert!(matches!(err, DeltaError::Module { phase: "interupdate", .. }));

        let mut failing = Scripted::new("m", DeltaDesired::Infinite, &log);
        failing.post_ok = false;
        let mut modules = ModuleRegistry::new();
        modules.register(failing).unwrap();
        let mut eng = engine(config(), modules, &store);
        let err = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap_err();
        assert!(matches!(err, DeltaError::Module { phase: "postupdate", .. }));
    }

    #[test]
    fn preupdate_narrows_the_substep() {
        let log = new_log();
        let mut modules = ModuleRegistry::new();
        modules
            .register(Scripted::new("m", DeltaDesired::Infinite, &log).pre(Ok(Dt::from_millis(4))))
            .unwrap();
        let (store, _) = delta_store(&[]);
        let mut eng = engine(config(), modules, &store);
        let ep = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        assert_eq!(ep.elapsed, Dt::from_millis(4));
        assert_eq!(eng.profile().t_min, Some(Dt::from_millis(4)));
    }

    #[test]
    fn forced_extra_timesteps() {
        let (store, _) = delta_store(&[&[]]);
        let cfg = DeltaConfig { forced_extra_timesteps: 2, ..config() };
        let mut eng = engine(cfg, ModuleRegistry::new(), &store);
        let ep = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        assert_eq!(ep.substeps, 3);
        assert_eq!(ep.end, EpisodeEnd::Event);
    }

    #[test]
    fn forced_always_runs_to_maximum_time() {
        let (store, _) = delta_store(&[&[]]);
        let cfg = DeltaConfig { forced_always: true, maximum_time: Dt::from_millis(50), ..config() };
        let mut eng = engine(cfg, ModuleRegistry::new(), &store);
        let ep = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        assert_eq!(ep.substeps, 5);
        assert_eq!(ep.end, EpisodeEnd::MaximumTime);
        assert_eq!(ep.advance, 1);
    }

    #[test]
    fn stop_time_ends_the_episode() {
        let (store, _) = delta_store(&[&[]]);
        let cfg = DeltaConfig { forced_always: true, timestep: Dt::from_millis(400), ..config() };
        let mut eng = engine(cfg, ModuleRegistry::new(), &store);
        let ep = eng.run(Timestamp(10), Timestamp(11), Dt::from_millis(400)).unwrap();
        assert_eq!(ep.end, EpisodeEnd::StopTime);
        assert_eq!(ep.substeps, 3);
        assert_eq!(ep.elapsed, Dt::from_millis(1_200));
        assert_eq!(ep.advance, 2);
    }

    #[test]
    fn out_of_service_objects_are_skipped() {
        let mut store = ObjectStore::default();
        let id = store.insert(ClassId(0), None, voter(&[Vote::Error])).unwrap();
        store.enable_delta_mode(id).unwrap();
        store.set_service_window(id, Timestamp(100), Timestamp(200)).unwrap();
        let store = Arc::new(store);

        let mut eng = engine(config(), ModuleRegistry::new(), &store);
        let ep = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        assert_eq!(ep.substeps, 1);
        assert_eq!(updates_of(&store, id), 0);
    }

    #[test]
    fn threaded_updates_merge_like_inline() {
        let quiet: &[Vote] = &[];
        let mut scripts = vec![quiet; 12];
        scripts[9] = &[Vote::Delta, Vote::Delta];
        let (store, ids) = delta_store(&scripts);
        let pool = WorkerPool::new("delta-test", 4).unwrap();
        let mut eng = DeltaEngine::new(config(), ModuleRegistry::new(), Arc::clone(&store), &pool, 2).unwrap();
        let ep = eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        assert_eq!(ep.substeps, 3);
        assert!(ids.iter().all(|&id| updates_of(&store, id) == 3));
    }

    #[test]
    fn lower_ranks_update_before_higher_ranks() {
        let log = new_log();
        let mut store = ObjectStore::default();
        let ordered = |label: String, delay_ms: u64| {
            Box::new(Ordered { label, delay: Duration::from_millis(delay_ms), log: Arc::clone(&log) })
        };
        let parent = store.insert(ClassId(0), Some("parent"), ordered("parent-r1".into(), 0)).unwrap();
        store.enable_delta_mode(parent).unwrap();
        for k in 0..4 {
            let child = store.insert(ClassId(0), None, ordered(format!("child-r0-{k}"), 50)).unwrap();
            store.enable_delta_mode(child).unwrap();
            store.set_parent(child, parent).unwrap();
        }
        let store = Arc::new(store);

        let pool = WorkerPool::new("delta-test", 2).unwrap();
        let mut eng = DeltaEngine::new(config(), ModuleRegistry::new(), Arc::clone(&store), &pool, 1).unwrap();
        let levels: Vec<_> = eng.context().levels().map(|(rank, ids)| (rank, ids.len())).collect();
        assert_eq!(levels, vec![(0, 4), (1, 1)]);

        eng.run(Timestamp(0), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        let order = log.lock().unwrap().clone();
        assert_eq!(order.len(), 5);
        assert_eq!(order.last().map(String::as_str), Some("parent-r1"));
        assert!(order[..4].iter().all(|l| l.starts_with("child-r0")));
    }

    #[test]
    fn profile_accumulates_over_episodes() {
        let (store, _) = delta_store(&[&[]]);
        let mut eng = engine(config(), ModuleRegistry::new(), &store);
        for clock in [0, 5, 9] {
            eng.run(Timestamp(clock), Timestamp::NEVER, Dt::from_millis(10)).unwrap();
        }
        let p = eng.profile();
        assert_eq!(p.episodes, 3);
        assert_eq!(p.substeps, 3);
        assert_eq!(p.t_delta, Dt::from_millis(30));
        assert_eq!(p.t_max, Some(Dt::from_millis(10)));
        assert!(p.mean_step().is_some());
    }
}
