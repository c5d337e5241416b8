//! Object arena: `ObjectStore` owns every `ObjectEntry`.
//!
//! # Two phases
//!
//! While the model is loaded the store is owned mutably: objects are created,
//! named, linked and ranked through `&mut ObjectStore`.  Once the run starts it
//! is frozen behind an `Arc` and shared with the pass workers.  From then on
//! the header of an entry (class, rank, links, service window) is read-only
//! and only the [`ObjectState`] behind each entry's spinlock changes.
//!
//! ```text
//! ObjectEntry
//! ├── header      id, class, name, parent, dependents, rank, service window
//! ├── recalc      AtomicBool, raised by any object, cleared by the owner
//! └── state       SpinLock<ObjectState { clock, valid_to, model }>
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use gk_core::{ClassId, NextTime, ObjectId, Timestamp};
use gk_sync::{LockStats, SpinGuard, SpinLock};
use tracing::debug;

use crate::{ClassRegistry, NameMap, ObjectError, ObjectModel, ObjectResult};

/// Default spin retries before a lock is presumed deadlocked.
pub const DEFAULT_SPIN_LIMIT: u64 = 1_000_000_000;

// ── Service window ────────────────────────────────────────────────────────────

/// Where a time falls relative to an object's service window.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Service {
    /// Not yet in service; carries the in-service time.
    Before(Timestamp),
    In,
    After,
}

// ── ObjectState ───────────────────────────────────────────────────────────────

/// The mutable part of an object, guarded by the entry's spinlock.
pub struct ObjectState {
    /// Time the object was last committed to.
    pub clock:    Timestamp,
    /// Next time the object asked for; soft events are kept as such.
    pub valid_to: NextTime,
    pub model:    Box<dyn ObjectModel>,
}

// ── ObjectEntry ───────────────────────────────────────────────────────────────

pub struct ObjectEntry {
    id:         ObjectId,
    class:      ClassId,
    name:       Option<String>,
    pub(crate) parent:     Option<ObjectId>,
    /// Objects that must rank strictly above this one, besides the parent.
    pub(crate) dependents: Vec<ObjectId>,
    pub(crate) rank:       u32,
    /// Set while the rank assignor is propagating through this object.
    pub(crate) rerank:     bool,
    in_svc:     Timestamp,
    out_svc:    Timestamp,
    delta_mode: bool,
    recalc:     AtomicBool,
    state:      SpinLock<ObjectState>,
}

impl ObjectEntry {
    fn new(
        id: ObjectId,
        class: ClassId,
        name: Option<String>,
        model: Box<dyn ObjectModel>,
        spin_limit: u64,
    ) -> Self {
        Self {
            id,
            class,
            name,
            parent: None,
            dependents: Vec::new(),
            rank: 0,
            rerank: false,
            in_svc: Timestamp(i64::MIN),
            out_svc: Timestamp::NEVER,
            delta_mode: false,
            recalc: AtomicBool::new(false),
            state: SpinLock::new(
                ObjectState { clock: Timestamp::ZERO, valid_to: NextTime::Never, model },
                spin_limit,
            ),
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if set, otherwise the handle, for log messages.
    pub fn label(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => self.id.to_string(),
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn dependents(&self) -> &[ObjectId] {
        &self.dependents
    }

    #[inline]
    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn in_svc(&self) -> Timestamp {
        self.in_svc
    }

    pub fn out_svc(&self) -> Timestamp {
        self.out_svc
    }

    pub fn service_at(&self, t: Timestamp) -> Service {
        if t < self.in_svc {
            Service::Before(self.in_svc)
        } else if t >= self.out_svc {
            Service::After
        } else {
            Service::In
        }
    }

    /// `true` if the object takes part in delta-mode episodes.
    #[inline]
    pub fn delta_mode(&self) -> bool {
        self.delta_mode
    }

    pub fn needs_recalc(&self) -> bool {
        self.recalc.load(Ordering::Acquire)
    }

    pub fn mark_recalc(&self) {
        self.recalc.store(true, Ordering::Release);
    }

    /// Clear the recalc flag, returning whether it was set.
    pub fn take_recalc(&self) -> bool {
        self.recalc.swap(false, Ordering::AcqRel)
    }

    /// Lock the object's state.
    pub fn lock<'a>(&'a self, stats: &LockStats) -> ObjectResult<SpinGuard<'a, ObjectState>> {
        self.state
            .lock_counted(stats)
            .map_err(|source| ObjectError::Lock { object: self.id, source })
    }

    /// Exclusive access during loading.
    pub fn state_mut(&mut self) -> &mut ObjectState {
        self.state.get_mut()
    }
}

// ── ObjectStore ───────────────────────────────────────────────────────────────

/// Arena of every object in the run, indexed by [`ObjectId`].
pub struct ObjectStore {
    pub(crate) entries: Vec<ObjectEntry>,
    by_name:            NameMap<ObjectId>,
    spin_limit:         u64,
    lock_stats:         LockStats,
    delta_requested:    AtomicBool,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new(DEFAULT_SPIN_LIMIT)
    }
}

impl ObjectStore {
    /// Empty store whose object locks give up after `spin_limit` retries.
    pub fn new(spin_limit: u64) -> Self {
        Self {
            entries: Vec::new(),
            by_name: NameMap::default(),
            spin_limit,
            lock_stats: LockStats::new(),
            delta_requested: AtomicBool::new(false),
        }
    }

    /// Create an object of `class` using the class factory.
    pub fn create(
        &mut self,
        classes: &ClassRegistry,
        class: ClassId,
        name: Option<&str>,
    ) -> ObjectResult<ObjectId> {
        let model = classes.get(class)?.instantiate();
        self.insert(class, name, model)
    }

    /// Add an object with an already-built model.
    pub fn insert(
        &mut self,
        class: ClassId,
        name: Option<&str>,
        model: Box<dyn ObjectModel>,
    ) -> ObjectResult<ObjectId> {
        if let Some(n) = name {
            if self.by_name.contains_key(n) {
                return Err(ObjectError::DuplicateName(n.to_owned()));
            }
        }
        let id = ObjectId::try_from(self.entries.len()).map_err(|_| ObjectError::Capacity)?;
        self.entries.push(ObjectEntry::new(id, class, name.map(str::to_owned), model, self.spin_limit));
        if let Some(n) = name {
            self.by_name.insert(n.to_owned(), id);
        }
        debug!(%id, %class, ?name, "object created");
        Ok(id)
    }

    /// Restrict synchronization of `id` to `[in_svc, out_svc)`.
    pub fn set_service_window(&mut self, id: ObjectId, in_svc: Timestamp, out_svc: Timestamp) -> ObjectResult<()> {
        if in_svc >= out_svc {
            return Err(ObjectError::InvalidServiceWindow { object: id, in_svc, out_svc });
        }
        let entry = self.get_mut(id)?;
        entry.in_svc = in_svc;
        entry.out_svc = out_svc;
        Ok(())
    }

    /// Enrol `id` in delta-mode episodes.
    pub fn enable_delta_mode(&mut self, id: ObjectId) -> ObjectResult<()> {
        self.get_mut(id)?.delta_mode = true;
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> ObjectResult<&ObjectEntry> {
        self.entries.get(id.index()).ok_or(ObjectError::UnknownObject(id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> ObjectResult<&mut ObjectEntry> {
        self.entries.get_mut(id.index()).ok_or(ObjectError::UnknownObject(id))
    }

    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.by_name.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All handles in creation order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().map(ObjectEntry::id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectEntry> {
        self.entries.iter()
    }

    /// Handles of every delta-mode object, in creation order.
    pub fn delta_objects(&self) -> Vec<ObjectId> {
        self.entries.iter().filter(|e| e.delta_mode).map(ObjectEntry::id).collect()
    }

    /// Lock the state of `id`.
    pub fn lock(&self, id: ObjectId) -> ObjectResult<SpinGuard<'_, ObjectState>> {
        self.get(id)?.lock(&self.lock_stats)
    }

    /// Run `f` on the model of `id`, which must be a `T`.
    pub fn read<T: ObjectModel, R>(&self, id: ObjectId, f: impl FnOnce(&T) -> R) -> ObjectResult<R> {
        let guard = self.lock(id)?;
        let model = guard
            .model
            .downcast_ref::<T>()
            .ok_or(ObjectError::TypeMismatch { object: id, expected: std::any::type_name::<T>() })?;
        Ok(f(model))
    }

    /// Run `f` on the model of `id` mutably.
    pub fn write<T: ObjectModel, R>(&self, id: ObjectId, f: impl FnOnce(&mut T) -> R) -> ObjectResult<R> {
        let mut guard = self.lock(id)?;
        let model = guard
            .model
            .downcast_mut::<T>()
            .ok_or(ObjectError::TypeMismatch { object: id, expected: std::any::type_name::<T>() })?;
        Ok(f(model))
    }

    /// Contention counters for every object lock in this store.
    pub fn lock_stats(&self) -> &LockStats {
        &self.lock_stats
    }

    /// Ask the kernel for a delta-mode episode after the current step.
    pub fn request_delta_mode(&self) {
        self.delta_requested.store(true, Ordering::Release);
    }

    /// Consume a pending delta-mode request.
    pub fn take_delta_request(&self) -> bool {
        self.delta_requested.swap(false, Ordering::AcqRel)
    }
}
