//! Kernel time model.
//!
//! # Design
//!
//! Discrete time is a signed count of whole seconds, `Timestamp`.  The value
//! `Timestamp::NEVER` (`i64::MAX`) means "no further event".
//!
//! Objects answer every synchronization call with a [`NextTime`]: the time at
//! which they next need attention.  A *soft* next time is advisory: it never
//! counts as a hard event and never tightens the discrete clock on its own.
//! Modules that still speak the legacy sign convention (negative = soft) can
//! round-trip through [`NextTime::from_raw`] / [`NextTime::to_raw`].
//!
//! Continuous (delta-mode) time is an unsigned nanosecond count, [`Dt`],
//! measured from the discrete clock at which the episode started.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// An absolute discrete simulation time in whole seconds.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    /// "No further event."  Compares greater than every finite time.
    pub const NEVER: Timestamp = Timestamp(i64::MAX);

    #[inline]
    pub fn is_never(self) -> bool {
        self == Self::NEVER
    }

    /// Round up to the smallest multiple of `floor` that is `>= self`.
    ///
    /// A floor of 0 or 1 disables rounding; `NEVER` is returned unchanged.
    /// Saturates to `NEVER` instead of overflowing.
    pub fn round_up_to(self, floor: i64) -> Timestamp {
        if floor <= 1 || self.is_never() {
            return self;
        }
        let q = self.0.div_euclid(floor);
        if self.0.rem_euclid(floor) == 0 {
            return self;
        }
        q.checked_add(1)
            .and_then(|q| q.checked_mul(floor))
            .map_or(Self::NEVER, Timestamp)
    }

    /// `self + secs`, saturating at `NEVER`.
    #[inline]
    pub fn saturating_add(self, secs: i64) -> Timestamp {
        if self.is_never() {
            return self;
        }
        Timestamp(self.0.saturating_add(secs))
    }
}

impl Add<i64> for Timestamp {
    type Output = Timestamp;
    #[inline]
    fn add(self, rhs: i64) -> Timestamp {
        self.saturating_add(rhs)
    }
}

/// Seconds from `rhs` to `self`, saturating at the `i64` bounds.
impl Sub for Timestamp {
    type Output = i64;
    #[inline]
    fn sub(self, rhs: Timestamp) -> i64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            f.write_str("NEVER")
        } else {
            write!(f, "{}s", self.0)
        }
    }
}

// ── NextTime ──────────────────────────────────────────────────────────────────

/// The answer an object gives to a synchronization call.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum NextTime {
    /// The object must be synchronized again at this time.
    Hard(Timestamp),
    /// The object would like to be synchronized at this time if the clock is
    /// going to stop there anyway.
    Soft(Timestamp),
    /// The object expects no further state change.
    #[default]
    Never,
}

impl NextTime {
    #[inline]
    pub fn hard(secs: i64) -> NextTime {
        NextTime::Hard(Timestamp(secs))
    }

    #[inline]
    pub fn soft(secs: i64) -> NextTime {
        NextTime::Soft(Timestamp(secs))
    }

    /// Decode the legacy sign convention: `i64::MAX` is never, values below
    /// `-1` are soft events at `-raw`, everything else is a hard event.
    pub fn from_raw(raw: i64) -> NextTime {
        match raw {
            i64::MAX => NextTime::Never,
            r if r < -1 => NextTime::Soft(Timestamp(-r)),
            r => NextTime::Hard(Timestamp(r)),
        }
    }

    /// Encode into the legacy sign convention.
    pub fn to_raw(self) -> i64 {
        match self {
            NextTime::Hard(t) => t.0,
            NextTime::Soft(t) => -t.0,
            NextTime::Never => i64::MAX,
        }
    }

    /// The requested time regardless of softness; `NEVER` for [`NextTime::Never`].
    #[inline]
    pub fn time(self) -> Timestamp {
        match self {
            NextTime::Hard(t) | NextTime::Soft(t) => t,
            NextTime::Never => Timestamp::NEVER,
        }
    }

    #[inline]
    pub fn is_hard(self) -> bool {
        matches!(self, NextTime::Hard(t) if !t.is_never())
    }

    #[inline]
    pub fn is_soft(self) -> bool {
        matches!(self, NextTime::Soft(_))
    }
}

impl fmt::Display for NextTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextTime::Hard(t) => write!(f, "{t}"),
            NextTime::Soft(t) => write!(f, "~{t}"),
            NextTime::Never => f.write_str("NEVER"),
        }
    }
}

// ── Dt ────────────────────────────────────────────────────────────────────────

/// A continuous-time interval in nanoseconds.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Dt(pub u64);

impl Dt {
    pub const ZERO: Dt = Dt(0);
    pub const SECOND: Dt = Dt(1_000_000_000);

    #[inline]
    pub const fn from_nanos(ns: u64) -> Dt {
        Dt(ns)
    }

    #[inline]
    pub const fn from_millis(ms: u64) -> Dt {
        Dt(ms * 1_000_000)
    }

    #[inline]
    pub const fn from_secs(s: u64) -> Dt {
        Dt(s * Self::SECOND.0)
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / Self::SECOND.0 as f64
    }

    /// Whole seconds, dropping any fractional remainder.
    #[inline]
    pub fn floor_secs(self) -> i64 {
        (self.0 / Self::SECOND.0) as i64
    }

    /// `secs` whole seconds, saturating instead of overflowing.
    #[inline]
    pub fn from_secs_saturating(secs: u64) -> Dt {
        Dt(secs.saturating_mul(Self::SECOND.0))
    }

    /// Whole seconds, rounding any fractional remainder up.
    #[inline]
    pub fn ceil_secs(self) -> i64 {
        self.0.div_ceil(Self::SECOND.0) as i64
    }
}

impl Add for Dt {
    type Output = Dt;
    #[inline]
    fn add(self, rhs: Dt) -> Dt {
        Dt(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Dt {
    #[inline]
    fn add_assign(&mut self, rhs: Dt) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl fmt::Display for Dt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

// ── KernelClock ───────────────────────────────────────────────────────────────

/// The discrete clock driven by the pass scheduler.
///
/// `KernelClock` is cheap to copy and holds no heap data.
#[derive(Clone, Copy, Debug)]
pub struct KernelClock {
    /// Time at which the run started.
    pub start: Timestamp,
    /// Current discrete time.
    pub current: Timestamp,
    /// Exclusive upper bound; `NEVER` runs to steady state.
    pub stop: Timestamp,
}

impl KernelClock {
    pub fn new(start: Timestamp, stop: Timestamp) -> Self {
        Self { start, current: start, stop }
    }

    /// Move the clock to `t`.  The clock never runs backwards.
    #[inline]
    pub fn advance_to(&mut self, t: Timestamp) {
        debug_assert!(t >= self.current, "clock moved backwards: {} -> {t}", self.current);
        self.current = t;
    }

    /// Elapsed seconds since the start of the run.
    #[inline]
    pub fn elapsed_secs(&self) -> i64 {
        self.current - self.start
    }

    /// `true` once `t` would reach or pass the stop time.
    #[inline]
    pub fn is_past_stop(&self, t: Timestamp) -> bool {
        t >= self.stop
    }

    /// Break elapsed time into (day, hour, minute) components from start.
    pub fn elapsed_dhm(&self) -> (u64, u32, u32) {
        let total = self.elapsed_secs().max(0) as u64;
        let days = total / 86_400;
        let hours = ((total % 86_400) / 3_600) as u32;
        let minutes = ((total % 3_600) / 60) as u32;
        (days, hours, minutes)
    }
}

impl fmt::Display for KernelClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (d, h, m) = self.elapsed_dhm();
        write!(f, "{} (day {} {:02}:{:02})", self.current, d, h, m)
    }
}
