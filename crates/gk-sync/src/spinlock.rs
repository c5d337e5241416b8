//! CAS spinlocks.
//!
//! # Protocol
//!
//! 1. Acquisition is attempted only when the counter is even.
//! 2. A compare-and-swap from `v` to `v + 1` takes the lock.
//! 3. A failed swap, or an odd counter, restarts at (1).  After
//!    `spin_limit` restarts the acquisition fails with
//!    [`SyncError::LockTimeout`].
//! 4. Release increments the counter, which clears the hold bit and bumps the
//!    generation (`counter / 2`).
//!
//! Readers go through the same path as writers, so a read also serializes
//! against other reads.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tracing::warn;

use crate::{SyncError, SyncResult};

// ── SpinCounter ───────────────────────────────────────────────────────────────

/// The raw lock word.
#[derive(Debug, Default)]
pub struct SpinCounter {
    value: AtomicU32,
}

impl SpinCounter {
    pub const fn new() -> Self {
        Self { value: AtomicU32::new(0) }
    }

    /// Spin until the lock is taken or `spin_limit` retries are used up.
    ///
    /// Returns the number of retries it took.
    pub fn acquire(&self, spin_limit: u64) -> SyncResult<u64> {
        let mut spins = 0_u64;
        loop {
            let v = self.value.load(Ordering::Relaxed);
            if v & 1 == 0
                && self
                    .value
                    .compare_exchange_weak(v, v.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return Ok(spins);
            }
            spins += 1;
            if spins >= spin_limit {
                warn!(spins, generation = v / 2, "spinlock acquisition timed out");
                return Err(SyncError::LockTimeout { spins });
            }
            std::hint::spin_loop();
        }
    }

    /// Single attempt; `true` if the lock was taken.
    pub fn try_acquire(&self) -> bool {
        let v = self.value.load(Ordering::Relaxed);
        v & 1 == 0
            && self
                .value
                .compare_exchange(v, v.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    /// Shared acquisition.  Identical to [`write_lock`](Self::write_lock).
    #[inline]
    pub fn read_lock(&self, spin_limit: u64) -> SyncResult<u64> {
        self.acquire(spin_limit)
    }

    /// Exclusive acquisition.
    #[inline]
    pub fn write_lock(&self, spin_limit: u64) -> SyncResult<u64> {
        self.acquire(spin_limit)
    }

    /// Release a held lock.
    #[inline]
    pub fn release(&self) {
        let prev = self.value.fetch_add(1, Ordering::Release);
        debug_assert!(prev & 1 == 1, "released a spinlock that was not held");
    }

    /// `true` while some thread holds the lock.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.value.load(Ordering::Relaxed) & 1 == 1
    }

    /// Number of completed acquire/release cycles (mod 2^31).
    #[inline]
    pub fn generation(&self) -> u32 {
        self.value.load(Ordering::Relaxed) / 2
    }
}

// ── LockStats ─────────────────────────────────────────────────────────────────

/// Contention counters shared by every lock of one kernel instance.
#[derive(Debug, Default)]
pub struct LockStats {
    acquisitions: AtomicU64,
    spins:        AtomicU64,
}

impl LockStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&self, spins: u64) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if spins > 0 {
            self.spins.fetch_add(spins, Ordering::Relaxed);
        }
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    pub fn spins(&self) -> u64 {
        self.spins.load(Ordering::Relaxed)
    }

    /// Fraction of lock attempts that had to retry, in `[0, 1]`.
    pub fn contention(&self) -> f64 {
        let a = self.acquisitions() as f64;
        let s = self.spins() as f64;
        if a + s == 0.0 { 0.0 } else { s / (a + s) }
    }
}

// ── SpinLock<T> ───────────────────────────────────────────────────────────────

/// A value guarded by a [`SpinCounter`].
pub struct SpinLock<T: ?Sized> {
    counter:    SpinCounter,
    spin_limit: u64,
    data:       UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `counter`; a guard is the only way
// to reach it and only one guard exists at a time.
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub fn new(value: T, spin_limit: u64) -> Self {
        Self {
            counter: SpinCounter::new(),
            spin_limit: spin_limit.max(1),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquire the lock.
    pub fn lock(&self) -> SyncResult<SpinGuard<'_, T>> {
        self.counter.acquire(self.spin_limit)?;
        Ok(SpinGuard { lock: self })
    }

    /// Acquire the lock and record the retries in `stats`.
    pub fn lock_counted(&self, stats: &LockStats) -> SyncResult<SpinGuard<'_, T>> {
        let spins = self.counter.acquire(self.spin_limit)?;
        stats.record(spins);
        Ok(SpinGuard { lock: self })
    }

    /// Run `f` on the guarded value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> SyncResult<R> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    /// Exclusive access without locking; the borrow checker proves there are
    /// no other users.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.counter.is_held()
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.counter.generation()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default(), 1_000_000_000)
    }
}

/// Holds a [`SpinLock`]; releases it on drop.
pub struct SpinGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held by this thread.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; `&mut self` makes the borrow unique.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.counter.release();
    }
}
