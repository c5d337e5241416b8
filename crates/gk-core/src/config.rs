//! Kernel configuration.
//!
//! Typically loaded from a TOML file by the application crate (see the
//! `feeder` demo) and passed to `gk_exec::ExecBuilder`.  Every field has a
//! default, so a config file only needs to name what it changes.

use crate::{CoreError, CoreResult, Dt, Timestamp};

// ── KernelConfig ──────────────────────────────────────────────────────────────

/// Top-level scheduler configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KernelConfig {
    /// Discrete time of the first step.
    pub start_time: Timestamp,

    /// The run ends before the clock reaches this time.  `NEVER` runs until
    /// steady state (no hard events left).
    pub stop_time: Timestamp,

    /// Passes allowed at one clock value before the run fails to converge.
    pub iteration_limit: u32,

    /// Every finite next time is rounded up to a multiple of this many
    /// seconds.  `1` (or `0`) disables rounding.
    pub minimum_timestep: i64,

    /// Worker threads for the parallel passes.  `None` uses all logical
    /// cores; `Some(0)` and `Some(1)` run single threaded.
    pub thread_count: Option<usize>,

    /// A worker is only given a partition if it gets at least this many items.
    pub min_items_per_thread: usize,

    /// Spin retries before a lock acquisition is declared deadlocked.
    pub lock_spin_limit: u64,

    /// Keep objects inside a rank in creation order instead of shuffling them.
    pub deterministic: bool,

    /// Seed for the rank-level shuffle.
    pub seed: u64,

    /// Log profiler tables at the end of the run.
    pub profile: bool,

    /// Continuous-time (delta-mode) settings.
    pub delta: DeltaConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            start_time: Timestamp::ZERO,
            stop_time: Timestamp::NEVER,
            iteration_limit: 100,
            minimum_timestep: 1,
            thread_count: None,
            min_items_per_thread: 2,
            lock_spin_limit: 1_000_000_000,
            deterministic: false,
            seed: 0,
            profile: false,
            delta: DeltaConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Reject configurations the scheduler cannot run.
    pub fn validate(&self) -> CoreResult<()> {
        if self.iteration_limit == 0 {
            return Err(CoreError::Config("iteration_limit must be at least 1".into()));
        }
        if self.minimum_timestep < 0 {
            return Err(CoreError::Config(format!(
                "minimum_timestep must not be negative (got {})",
                self.minimum_timestep
            )));
        }
        if self.stop_time <= self.start_time {
            return Err(CoreError::Config(format!(
                "stop_time {} must be after start_time {}",
                self.stop_time, self.start_time
            )));
        }
        if self.start_time.is_never() {
            return Err(CoreError::InvalidTimestamp(self.start_time));
        }
        if self.lock_spin_limit == 0 {
            return Err(CoreError::Config("lock_spin_limit must be at least 1".into()));
        }
        self.delta.validate()
    }

    /// Number of worker threads to use, resolving `None` to the machine's
    /// logical core count.
    pub fn effective_threads(&self) -> usize {
        match self.thread_count {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

// ── DeltaConfig ───────────────────────────────────────────────────────────────

/// Delta-mode (continuous-time sub-stepping) settings.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeltaConfig {
    /// Ceiling on the sub-step size.  Default: 10 ms.
    pub timestep: Dt,

    /// Longest continuous time one episode may cover.  Default: 1 hour.
    pub maximum_time: Dt,

    /// Reiterations allowed on a single sub-step.
    pub iteration_limit: u32,

    /// Extra sub-steps taken after every voter has asked for event mode.
    pub forced_extra_timesteps: u32,

    /// Treat every event vote as a continuous-step vote (the episode only ends
    /// at `maximum_time` or the stop time).
    pub forced_always: bool,

    /// Module names to update first, in this order.  Modules not listed
    /// follow in registration order.
    pub module_order: Vec<String>,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            timestep: Dt::from_millis(10),
            maximum_time: Dt::from_secs(3_600),
            iteration_limit: 10,
            forced_extra_timesteps: 0,
            forced_always: false,
            module_order: Vec::new(),
        }
    }
}

impl DeltaConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.timestep.is_zero() {
            return Err(CoreError::Config("delta.timestep must be positive".into()));
        }
        if self.maximum_time.is_zero() {
            return Err(CoreError::Config("delta.maximum_time must be positive".into()));
        }
        if self.iteration_limit == 0 {
            return Err(CoreError::Config("delta.iteration_limit must be at least 1".into()));
        }
        Ok(())
    }
}
