//! Object models and the protection module of the feeder demo.

use std::f64::consts::TAU;

use gk_core::{DeltaStep, Dt, NextTime, ObjectId, Pass, Timestamp, Vote};
use gk_delta::{DeltaDesired, Module, ModuleError};
use gk_object::{ObjectModel, ObjectResult, SyncContext};
use tracing::{info, warn};

const DAY_SECS: f64 = 86_400.0;

// ── Meter ─────────────────────────────────────────────────────────────────────

/// Household load following a daily curve, sampled every `interval` seconds.
#[derive(Default)]
pub struct Meter {
    pub base_kw:  f64,
    pub load_kw:  f64,
    pub interval: i64,
    pub phase:    f64,
}

impl ObjectModel for Meter {
    fn sync(&mut self, pass: Pass, t: Timestamp, _ctx: &SyncContext<'_>) -> ObjectResult<NextTime> {
        if pass != Pass::BottomUp {
            return Ok(NextTime::Never);
        }
        let day = (t.0 as f64).rem_euclid(DAY_SECS) / DAY_SECS;
        self.load_kw = self.base_kw * (1.0 + 0.4 * (TAU * day + self.phase).sin());
        Ok(NextTime::Hard(t + self.interval))
    }
}

// ── Transformer ───────────────────────────────────────────────────────────────

/// Sums the meters it serves.
#[derive(Default)]
pub struct Transformer {
    pub meters:  Vec<ObjectId>,
    pub load_kw: f64,
    pub peak_kw: f64,
}

impl ObjectModel for Transformer {
    fn sync(&mut self, pass: Pass, _t: Timestamp, ctx: &SyncContext<'_>) -> ObjectResult<NextTime> {
        if pass == Pass::BottomUp {
            let mut total = 0.0;
            for &m in &self.meters {
                total += ctx.read::<Meter, _>(m, |m| m.load_kw)?;
            }
            self.load_kw = total;
            self.peak_kw = self.peak_kw.max(total);
        }
        Ok(NextTime::Never)
    }
}

// ── Substation ────────────────────────────────────────────────────────────────

/// Head of the feeder.  An overload asks for a delta-mode episode and holds
/// it open for a few sub-steps.
#[derive(Default)]
pub struct Substation {
    pub transformers: Vec<ObjectId>,
    pub limit_kw:     f64,
    pub load_kw:      f64,
    pub overloads:    u32,
    pub settle_steps: u32,
    pub(crate) settling: u32,
}

impl ObjectModel for Substation {
    fn init(&mut self, ctx: &SyncContext<'_>) -> ObjectResult<()> {
        if self.limit_kw <= 0.0 {
            return Err(gk_object::ObjectError::model(format!(
                "{}: limit_kw must be positive",
                ctx.entry()?.label()
            )));
        }
        Ok(())
    }

    fn sync(&mut self, pass: Pass, t: Timestamp, ctx: &SyncContext<'_>) -> ObjectResult<NextTime> {
        if pass != Pass::PostTopDown {
            return Ok(NextTime::Never);
        }
        let mut total = 0.0;
        for &x in &self.transformers {
            total += ctx.read::<Transformer, _>(x, |x| x.load_kw)?;
        }
        self.load_kw = total;
        if total > self.limit_kw && self.settling == 0 {
            warn!(clock = %t, load_kw = total, limit_kw = self.limit_kw, "substation overload");
            self.overloads += 1;
            self.settling = self.settle_steps;
            ctx.request_delta_mode();
        }
        Ok(NextTime::Never)
    }

    fn update(&mut self, _step: DeltaStep, _ctx: &SyncContext<'_>) -> Vote {
        if self.settling > 0 {
            self.settling -= 1;
            Vote::Delta
        } else {
            Vote::Event
        }
    }

    fn finalize(&mut self, ctx: &SyncContext<'_>) -> ObjectResult<()> {
        info!(object = %ctx.entry()?.label(), overloads = self.overloads, "substation finalized");
        Ok(())
    }
}

// ── Relay ─────────────────────────────────────────────────────────────────────

/// Protection relay that resolves a fault at `trip_at` in fine sub-steps.
pub struct Relay {
    pub trip_at:  Timestamp,
    pub step:     Dt,
    pub substeps: u32,
    seen:         u32,
    tripped:      bool,
}

impl Relay {
    pub fn new(trip_at: Timestamp, step: Dt, substeps: u32) -> Self {
        Self { trip_at, step, substeps, seen: 0, tripped: false }
    }
}

impl Module for Relay {
    fn name(&self) -> &str {
        "relay"
    }

    fn deltadesired(&mut self, clock: Timestamp) -> DeltaDesired {
        if !self.tripped && clock >= self.trip_at { DeltaDesired::Step(self.step) } else { DeltaDesired::Infinite }
    }

    fn interupdate(&mut self, _step: DeltaStep) -> Vote {
        if self.tripped {
            return Vote::Event;
        }
        self.seen += 1;
        if self.seen < self.substeps { Vote::Delta } else { Vote::Event }
    }

    fn postupdate(&mut self, clock: Timestamp, elapsed: Dt) -> Result<(), ModuleError> {
        if !self.tripped && self.seen >= self.substeps {
            self.tripped = true;
            info!(%clock, %elapsed, substeps = self.seen, "relay tripped");
        }
        Ok(())
    }
}
