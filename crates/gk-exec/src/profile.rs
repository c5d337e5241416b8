//! Main-loop profiling counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gk_core::{ClassId, Pass};
use gk_object::ClassRegistry;
use gk_sync::LockStats;
use tracing::info;

/// Sync count and time for one class, shared with the pass workers.
#[derive(Debug)]
pub struct ClassProfile {
    pub name: String,
    syncs:    AtomicU64,
    nanos:    AtomicU64,
}

impl ClassProfile {
    fn new(name: &str) -> Self {
        Self { name: name.to_owned(), syncs: AtomicU64::new(0), nanos: AtomicU64::new(0) }
    }

    pub(crate) fn record(&self, elapsed: Duration) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
        self.nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn syncs(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }

    pub fn time(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

/// Wall time per phase of the main loop, plus per-class sync statistics.
#[derive(Debug)]
pub struct ExecProfile {
    pub t_init:     Duration,
    /// Indexed by [`Pass::index`].
    pub t_pass:     [Duration; 3],
    pub t_commit:   Duration,
    pub t_delta:    Duration,
    pub t_finalize: Duration,
    pub t_wall:     Duration,
    /// Pass sweeps (all three passes) run, retries included.
    pub passes:     u64,
    /// Clock advances.
    pub steps:      u64,
    pub classes:    Arc<[ClassProfile]>,
}

impl ExecProfile {
    pub(crate) fn new(classes: &ClassRegistry) -> Self {
        Self {
            t_init: Duration::ZERO,
            t_pass: [Duration::ZERO; 3],
            t_commit: Duration::ZERO,
            t_delta: Duration::ZERO,
            t_finalize: Duration::ZERO,
            t_wall: Duration::ZERO,
            passes: 0,
            steps: 0,
            classes: classes.iter().map(|c| ClassProfile::new(c.name())).collect(),
        }
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassProfile> {
        self.classes.get(id.index())
    }

    /// Emit the profile as `tracing` events.
    pub fn log(&self, locks: &LockStats) {
        let ms = |d: Duration| d.as_secs_f64() * 1e3;
        info!(
            wall_ms = ms(self.t_wall),
            init_ms = ms(self.t_init),
            pretopdown_ms = ms(self.t_pass[Pass::PreTopDown.index()]),
            bottomup_ms = ms(self.t_pass[Pass::BottomUp.index()]),
            posttopdown_ms = ms(self.t_pass[Pass::PostTopDown.index()]),
            commit_ms = ms(self.t_commit),
            delta_ms = ms(self.t_delta),
            finalize_ms = ms(self.t_finalize),
            passes = self.passes,
            steps = self.steps,
            "kernel profile"
        );
        for class in self.classes.iter().filter(|c| c.syncs() > 0) {
            info!(
                class = %class.name,
                syncs = class.syncs(),
                time_ms = ms(class.time()),
                "class profile"
            );
        }
        info!(
            acquisitions = locks.acquisitions(),
            spins = locks.spins(),
            contention = locks.contention(),
            "lock contention"
        );
    }
}
