//! `gk-core` — foundational types for the `rust_gk` scheduling kernel.
//!
//! This crate is a dependency of every other `gk-*` crate.  It intentionally
//! has no `gk-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                  |
//! |-------------|-----------------------------------------------------------|
//! | [`ids`]     | `ObjectId`, `ClassId`, `ModuleId`                         |
//! | [`time`]    | `Timestamp`, `NextTime`, `Dt`, `KernelClock`              |
//! | [`mode`]    | `Pass`, `PassConfig`, `Vote`, `DeltaStep`                 |
//! | [`config`]  | `KernelConfig`, `DeltaConfig`                             |
//! | [`rng`]     | `ShuffleRng` (rank-level ordering)                        |
//! | [`error`]   | `CoreError`, `CoreResult`                                 |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to config and time types.   |

pub mod config;
pub mod error;
pub mod ids;
pub mod mode;
pub mod rng;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{DeltaConfig, KernelConfig};
pub use error::{CoreError, CoreResult};
pub use ids::{ClassId, ModuleId, ObjectId};
pub use mode::{DeltaStep, Pass, PassConfig, Vote};
pub use rng::ShuffleRng;
pub use time::{Dt, KernelClock, NextTime, Timestamp};
