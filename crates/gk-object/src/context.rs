//! Per-call view of the kernel handed to every model callback.

use gk_core::{ObjectId, Timestamp};

use crate::{ObjectEntry, ObjectError, ObjectModel, ObjectResult, ObjectStore};

/// What a model may see and touch during one callback.
///
/// The calling object's own state is already locked by the kernel and is
/// passed as `&mut self`; every other object is reached through
/// [`read`](Self::read) / [`write`](Self::write), which take that object's
/// spinlock for the duration of the closure.  Two objects of the same rank
/// that lock each other can deadlock; the spin limit turns that into a lock
/// error.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    store: &'a ObjectStore,
    this:  ObjectId,
    clock: Timestamp,
}

impl<'a> SyncContext<'a> {
    #[inline]
    pub fn new(store: &'a ObjectStore, this: ObjectId, clock: Timestamp) -> Self {
        Self { store, this, clock }
    }

    /// The object being called.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.this
    }

    /// The kernel clock at the time of the call.
    #[inline]
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    /// Header of the object being called.
    pub fn entry(&self) -> ObjectResult<&'a ObjectEntry> {
        self.store.get(self.this)
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.entry().ok().and_then(ObjectEntry::parent)
    }

    /// Header of any object (no lock needed, headers are immutable during a run).
    pub fn header(&self, id: ObjectId) -> ObjectResult<&'a ObjectEntry> {
        self.store.get(id)
    }

    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.store.find(name)
    }

    /// Run `f` on another object's model under its lock.
    pub fn read<T: ObjectModel, R>(&self, id: ObjectId, f: impl FnOnce(&T) -> R) -> ObjectResult<R> {
        self.other(id)?;
        self.store.read(id, f)
    }

    /// Run `f` on another object's model mutably under its lock.
    pub fn write<T: ObjectModel, R>(&self, id: ObjectId, f: impl FnOnce(&mut T) -> R) -> ObjectResult<R> {
        self.other(id)?;
        self.store.write(id, f)
    }

    /// Ask for `id`'s `recalc` callback before its next sync.
    pub fn mark_recalc(&self, id: ObjectId) -> ObjectResult<()> {
        self.store.get(id)?.mark_recalc();
        Ok(())
    }

    /// Ask for a delta-mode episode once the current step settles.
    pub fn request_delta_mode(&self) {
        self.store.request_delta_mode();
    }

    fn other(&self, id: ObjectId) -> ObjectResult<()> {
        if id == self.this { Err(ObjectError::SelfAccess(id)) } else { Ok(()) }
    }
}
