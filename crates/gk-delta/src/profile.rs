//! Delta-mode profiling counters.

use std::time::Duration;

use gk_core::Dt;
use tracing::info;

/// Wall time spent per delta-mode phase, plus sub-step statistics.
#[derive(Debug, Clone, Default)]
pub struct DeltaProfile {
    pub t_init:        Duration,
    pub t_preupdate:   Duration,
    pub t_update:      Duration,
    pub t_interupdate: Duration,
    pub t_postupdate:  Duration,
    /// Episodes run.
    pub episodes:      u64,
    /// Sub-steps consumed over all episodes.
    pub substeps:      u64,
    /// Object update fan-outs, reiterations included.
    pub updates:       u64,
    pub t_min:         Option<Dt>,
    pub t_max:         Option<Dt>,
    /// Continuous time covered by all episodes.
    pub t_delta:       Dt,
    /// Qualifying modules, in update order.
    pub module_list:   Vec<String>,
}

impl DeltaProfile {
    pub(crate) fn record_step(&mut self, timestep: Dt) {
        self.substeps += 1;
        self.t_min = Some(self.t_min.map_or(timestep, |t| t.min(timestep)));
        self.t_max = Some(self.t_max.map_or(timestep, |t| t.max(timestep)));
    }

    /// Mean simulated seconds per sub-step.
    pub fn mean_step(&self) -> Option<f64> {
        (self.substeps > 0).then(|| self.t_delta.as_secs_f64() / self.substeps as f64)
    }

    /// Emit the profile as `tracing` events.
    pub fn log(&self) {
        info!(
            modules = %self.module_list.join(","),
            episodes = self.episodes,
            substeps = self.substeps,
            updates = self.updates,
            simulated = %self.t_delta,
            min_step = ?self.t_min.map(|t| t.to_string()),
            max_step = ?self.t_max.map(|t| t.to_string()),
            "delta-mode profile"
        );
        info!(
            init_ms = self.t_init.as_secs_f64() * 1e3,
            preupdate_ms = self.t_preupdate.as_secs_f64() * 1e3,
            update_ms = self.t_update.as_secs_f64() * 1e3,
            interupdate_ms = self.t_interupdate.as_secs_f64() * 1e3,
            postupdate_ms = self.t_postupdate.as_secs_f64() * 1e3,
            "delta-mode timing"
        );
    }
}
