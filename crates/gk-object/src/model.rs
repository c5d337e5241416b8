//! The `ObjectModel` trait — the per-object callback set.

use std::any::Any;

use gk_core::{DeltaStep, NextTime, Pass, Timestamp, Vote};

use crate::{ObjectResult, SyncContext};

/// Pluggable object behavior.
///
/// One boxed model lives inside every object of the arena.  The kernel calls
/// it under the object's own spinlock, so a model only ever sees `&mut self`
/// from one thread at a time.  Reaching into *another* object goes through
/// [`SyncContext::read`] / [`SyncContext::write`].
///
/// Only [`sync`][Self::sync] is required.
///
/// # Example
///
/// ```rust,ignore
/// struct Meter { period: i64 }
///
/// impl ObjectModel for Meter {
///     fn sync(&mut self, pass: Pass, t: Timestamp, _ctx: &SyncContext<'_>) -> ObjectResult<NextTime> {
///         Ok(match pass {
///             Pass::BottomUp => NextTime::Hard(t + self.period),
///             _ => NextTime::Never,
///         })
///     }
/// }
/// ```
pub trait ObjectModel: AsAny + Send + 'static {
    /// Runs once, in creation order, before the first step.
    fn init(&mut self, _ctx: &SyncContext<'_>) -> ObjectResult<()> {
        Ok(())
    }

    /// Synchronize to `t` during `pass` and report when the object next needs
    /// attention.  Only called for passes the object's class takes part in.
    fn sync(&mut self, pass: Pass, t: Timestamp, ctx: &SyncContext<'_>) -> ObjectResult<NextTime>;

    /// Runs before the next sync whenever the recalc flag was raised.
    fn recalc(&mut self, _ctx: &SyncContext<'_>) -> ObjectResult<()> {
        Ok(())
    }

    /// Runs once per step after the passes settled, just before the clock
    /// moves from `t_prev` to `t_next`.
    fn commit(&mut self, _t_prev: Timestamp, _t_next: Timestamp) -> ObjectResult<()> {
        Ok(())
    }

    /// Runs once at the end of the run.
    fn finalize(&mut self, _ctx: &SyncContext<'_>) -> ObjectResult<()> {
        Ok(())
    }

    /// Continuous-time update.  Only called for objects registered for delta
    /// mode.  Default: ready to return to event mode.
    fn update(&mut self, _step: DeltaStep, _ctx: &SyncContext<'_>) -> Vote {
        Vote::Event
    }
}

// ── Downcasting ───────────────────────────────────────────────────────────────

/// Object-safe access to `Any`, implemented for every sized `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn ObjectModel {
    /// The concrete model, if it is a `T`.
    pub fn downcast_ref<T: ObjectModel>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: ObjectModel>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}
