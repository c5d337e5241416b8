//! Builder that loads a model and freezes it into a runnable [`Exec`].

use std::sync::Arc;
use std::time::Instant;

use gk_core::{ClassId, KernelClock, KernelConfig, ModuleId, ObjectId, Pass, PassConfig, ShuffleRng, Timestamp};
use gk_delta::{DeltaEngine, Module, ModuleRegistry};
use gk_object::{ClassRegistry, ObjectError, ObjectModel, ObjectStore, RankLevels};
use gk_sync::{ParallelIterator, WorkerPool};
use tracing::{debug, info};

use crate::sync::sync_object;
use crate::{Exec, ExecProfile, ExecResult, StopHandle, SyncState};

/// Loads classes, objects, edges and modules, then builds an [`Exec`].
///
/// The loader owns the store mutably while it works; [`build`](Self::build)
/// freezes it behind an `Arc`, indexes the rank levels and spawns the
/// worker pool.  No edge can be added afterwards.
///
/// # Example
///
/// ```rust,ignore
/// let mut b = ExecBuilder::new(config);
/// let meter = b.register_class("meter", PassConfig::BOTTOMUP, Meter::default)?;
/// let m = b.create(meter, Some("m1"))?;
/// let feeder = b.create(feeder_class, Some("f1"))?;
/// b.set_parent(m, feeder)?;
/// let mut exec = b.build()?;
/// exec.run(&mut NoopObserver)?;
/// ```
pub struct ExecBuilder {
    config:  KernelConfig,
    classes: ClassRegistry,
    store:   ObjectStore,
    modules: ModuleRegistry,
    stop:    StopHandle,
}

impl ExecBuilder {
    pub fn new(config: KernelConfig) -> Self {
        let store = ObjectStore::new(config.lock_spin_limit);
        Self {
            config,
            classes: ClassRegistry::new(),
            store,
            modules: ModuleRegistry::new(),
            stop: StopHandle::new(),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ── Classes and objects ───────────────────────────────────────────────

    pub fn register_class<M, F>(&mut self, name: &str, passes: PassConfig, factory: F) -> ExecResult<ClassId>
    where
        M: ObjectModel,
        F: Fn() -> M + Send + Sync + 'static,
    {
        Ok(self.classes.register(name, passes, factory)?)
    }

    /// Warn at init about unnamed objects of `class`.
    pub fn force_name(&mut self, class: ClassId) -> ExecResult<()> {
        Ok(self.classes.set_force_name(class, true)?)
    }

    /// Create an object of `class` with the class factory.
    pub fn create(&mut self, class: ClassId, name: Option<&str>) -> ExecResult<ObjectId> {
        Ok(self.store.create(&self.classes, class, name)?)
    }

    /// Create an object of the class registered as `class`.
    pub fn create_by_name(&mut self, class: &str, name: Option<&str>) -> ExecResult<ObjectId> {
        let id = self
            .classes
            .find(class)
            .ok_or_else(|| ObjectError::UnknownClass(class.to_owned()))?;
        self.create(id, name)
    }

    /// Add an object with an already-built model.
    pub fn insert(&mut self, class: ClassId, name: Option<&str>, model: Box<dyn ObjectModel>) -> ExecResult<ObjectId> {
        self.classes.get(class)?;
        Ok(self.store.insert(class, name, model)?)
    }

    // ── Edges and flags ───────────────────────────────────────────────────

    pub fn set_parent(&mut self, child: ObjectId, parent: ObjectId) -> ExecResult<u32> {
        Ok(self.store.set_parent(child, parent)?)
    }

    pub fn set_dependent(&mut self, subject: ObjectId, dependent: ObjectId) -> ExecResult<u32> {
        Ok(self.store.set_dependent(subject, dependent)?)
    }

    pub fn set_rank(&mut self, obj: ObjectId, rank: u32) -> ExecResult<u32> {
        Ok(self.store.set_rank(obj, rank)?)
    }

    pub fn set_service_window(&mut self, obj: ObjectId, in_svc: Timestamp, out_svc: Timestamp) -> ExecResult<()> {
        Ok(self.store.set_service_window(obj, in_svc, out_svc)?)
    }

    pub fn enable_delta_mode(&mut self, obj: ObjectId) -> ExecResult<()> {
        Ok(self.store.enable_delta_mode(obj)?)
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Direct access for loaders that drive the store themselves.
    pub fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    // ── Modules ───────────────────────────────────────────────────────────

    pub fn register_module(&mut self, module: impl Module) -> ExecResult<ModuleId> {
        Ok(self.modules.register(module)?)
    }

    /// Handle that stops the built kernel between steps.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // ── Build ─────────────────────────────────────────────────────────────

    /// Validate the configuration, index the rank levels of every pass and
    /// start the worker pool shared by every level and the delta engine.
    pub fn build(self) -> ExecResult<Exec> {
        let started = Instant::now();
        self.config.validate()?;

        let threads = self.config.effective_threads();
        let min_items = self.config.min_items_per_thread;
        let store = Arc::new(self.store);
        let profile = ExecProfile::new(&self.classes);

        let mut rng = ShuffleRng::new(self.config.seed);
        let mut levels = Vec::with_capacity(Pass::ALL.len());
        for pass in Pass::ALL {
            let mut child = rng.child(pass.index() as u64);
            let shuffle = (!self.config.deterministic).then_some(&mut child);
            levels.push(RankLevels::build(&store, &self.classes, pass, shuffle)?);
        }

        let pool = WorkerPool::new("gk-worker", threads)?;

        let mut bottomup = Vec::new();
        for (rank, ids) in levels[Pass::BottomUp.index()].in_pass_order() {
            let shared = Arc::clone(&store);
            let classes = Arc::clone(&profile.classes);
            let iter = ParallelIterator::builder(format!("bottomup-r{rank}"), ids.to_vec())
                .pool(&pool)
                .min_items(min_items)
                .build(
                    SyncState::default(),
                    move |clock: &Timestamp, id: &ObjectId| {
                        sync_object(&shared, &classes, Pass::BottomUp, *clock, *id)
                    },
                    SyncState::merge,
                )?;
            bottomup.push(iter);
        }

        let delta = DeltaEngine::new(self.config.delta.clone(), self.modules, Arc::clone(&store), &pool, min_items)?;

        debug!(
            threads,
            workers = pool.size(),
            levels = bottomup.len(),
            delta_objects = delta.context().objects.len(),
            delta_modules = delta.context().modules.len(),
            "kernel built"
        );
        info!(
            objects = store.len(),
            classes = self.classes.len(),
            max_rank = store.max_rank().unwrap_or(0),
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "model loaded"
        );

        Ok(Exec {
            clock: KernelClock::new(self.config.start_time, self.config.stop_time),
            config: self.config,
            classes: self.classes,
            store,
            levels,
            pool,
            bottomup,
            delta,
            stop: self.stop,
            profile,
            initialized: false,
            episodes: 0,
        })
    }
}
