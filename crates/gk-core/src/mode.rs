//! Pass identifiers and delta-mode votes.

use std::fmt;

use crate::{Dt, Timestamp};

// ── Pass ──────────────────────────────────────────────────────────────────────

/// One of the three synchronization passes run every discrete timestep.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Pass {
    /// Highest rank first: push upstream state down before dependents compute.
    PreTopDown,
    /// Lowest rank first: objects report their next-needed time.
    BottomUp,
    /// Highest rank first: distribute bottom-up results to dependents.
    PostTopDown,
}

impl Pass {
    /// All passes in execution order.
    pub const ALL: [Pass; 3] = [Pass::PreTopDown, Pass::BottomUp, Pass::PostTopDown];

    /// `true` if ranks are visited from highest to lowest.
    #[inline]
    pub fn is_top_down(self) -> bool {
        !matches!(self, Pass::BottomUp)
    }

    /// Position in [`Pass::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Pass::PreTopDown => 0,
            Pass::BottomUp => 1,
            Pass::PostTopDown => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Pass::PreTopDown => "pretopdown",
            Pass::BottomUp => "bottomup",
            Pass::PostTopDown => "posttopdown",
        }
    }

    #[inline]
    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── PassConfig ────────────────────────────────────────────────────────────────

/// The set of passes a class takes part in.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct PassConfig(u8);

impl PassConfig {
    /// Never synchronized (init/commit/finalize still run).
    pub const NONE: PassConfig = PassConfig(0);
    pub const PRETOPDOWN: PassConfig = PassConfig(0b001);
    pub const BOTTOMUP: PassConfig = PassConfig(0b010);
    pub const POSTTOPDOWN: PassConfig = PassConfig(0b100);
    pub const ALL: PassConfig = PassConfig(0b111);

    #[inline]
    pub fn contains(self, pass: Pass) -> bool {
        self.0 & pass.bit() != 0
    }

    #[inline]
    pub fn with(self, pass: Pass) -> PassConfig {
        PassConfig(self.0 | pass.bit())
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for PassConfig {
    type Output = PassConfig;
    #[inline]
    fn bitor(self, rhs: PassConfig) -> PassConfig {
        PassConfig(self.0 | rhs.0)
    }
}

// ── Vote ──────────────────────────────────────────────────────────────────────

/// Outcome of a delta-mode update, from an object or a module.
///
/// Votes are ordered by precedence: combining two votes with [`Vote::merge`]
/// keeps the stronger one (`Error` > `Reiterate` > `Delta` > `Event`).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum Vote {
    /// Ready to return to event (discrete) mode.
    #[default]
    Event,
    /// Wants one more continuous sub-step.
    Delta,
    /// Wants the current sub-step solved again.
    Reiterate,
    /// Failed; the episode must abort.
    Error,
}

impl Vote {
    /// Reconcile two votes by precedence.  Associative and commutative.
    #[inline]
    pub fn merge(self, other: Vote) -> Vote {
        self.max(other)
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Vote::Event => "event",
            Vote::Delta => "delta",
            Vote::Reiterate => "reiterate",
            Vote::Error => "error",
        })
    }
}

// ── DeltaStep ─────────────────────────────────────────────────────────────────

/// Position of one delta-mode update inside its episode.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DeltaStep {
    /// Discrete clock at which the episode started.
    pub clock: Timestamp,
    /// Continuous time already consumed by the episode.
    pub elapsed: Dt,
    /// Width of the sub-step being solved.
    pub timestep: Dt,
    /// Reiteration count on this sub-step, starting at 0.
    pub iteration: u32,
}

impl DeltaStep {
    /// Continuous time at the end of this sub-step.
    #[inline]
    pub fn end(&self) -> Dt {
        self.elapsed + self.timestep
    }
}
