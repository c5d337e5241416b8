//! `gk-delta` — continuous-time sub-stepping between discrete steps.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                         |
//! |-------------|------------------------------------------------------------------|
//! | [`module`]  | `Module` trait, `DeltaDesired`, `ModuleRegistry` (update order)  |
//! | [`context`] | `DeltaModeContext` — qualifying modules/objects, episode state   |
//! | [`engine`]  | `DeltaEngine` — entry negotiation and episode loop, `Episode`    |
//! | [`profile`] | `DeltaProfile` — per-phase timing and sub-step statistics        |
//! | [`error`]   | `DeltaError`, `ModuleError`, `DeltaResult<T>`                    |
//!
//! # Design notes
//!
//! Modules are few and stateful, so they are driven sequentially on the
//! caller's thread.  Objects are many; their `update` calls run one rank
//! level at a time, lowest rank first, and each level fans out over a
//! `gk_sync::ParallelIterator` on the kernel's shared `WorkerPool`.  Workers
//! hold an `Arc<ObjectStore>` and lock each object while it updates.  Votes merge by precedence
//! (`Error` > `Reiterate` > `Delta` > `Event`), so the merge is independent
//! of how the objects were partitioned.

pub mod context;
pub mod engine;
pub mod error;
pub mod module;
pub mod profile;

#[cfg(test)]
mod tests;

#[cfg(feature = "fx-hash")]
pub(crate) type NameMap<V> = rustc_hash::FxHashMap<String, V>;
#[cfg(not(feature = "fx-hash"))]
pub(crate) type NameMap<V> = std::collections::HashMap<String, V>;

pub use context::DeltaModeContext;
pub use engine::{DeltaEngine, Episode, EpisodeEnd};
pub use error::{DeltaError, DeltaResult, ModuleError};
pub use module::{DeltaDesired, Module, ModuleRegistry};
pub use profile::DeltaProfile;
