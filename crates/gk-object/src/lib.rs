//! `gk-object` — the object graph of the `rust_gk` scheduling kernel.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                    |
//! |---------------|-------------------------------------------------------------|
//! | [`model`]     | `ObjectModel` trait (per-object callbacks), `AsAny`         |
//! | [`class`]     | `ClassRegistry`, `ClassInfo` (pass participation, factory)  |
//! | [`store`]     | `ObjectStore` arena, `ObjectEntry`, `ObjectState`, `Service`|
//! | [`rank`]      | rank assignor: `set_parent`, `set_dependent`, `set_rank`    |
//! | [`levels`]    | `RankLevels` (objects bucketed by rank, one table per pass) |
//! | [`context`]   | `SyncContext` (what a callback may see and touch)           |
//! | [`error`]     | `ObjectError`, `RankError`                                  |
//!
//! # Feature flags
//!
//! | Flag      | Effect                                                       |
//! |-----------|--------------------------------------------------------------|
//! | `fx-hash` | FxHash instead of SipHash for the name indexes.              |
//! | `serde`   | Propagates serde derives to the `gk-core` types.             |

pub mod class;
pub mod context;
pub mod error;
pub mod levels;
pub mod model;
pub mod rank;
pub mod store;

#[cfg(test)]
mod tests;

#[cfg(feature = "fx-hash")]
pub(crate) type NameMap<V> = rustc_hash::FxHashMap<String, V>;
#[cfg(not(feature = "fx-hash"))]
pub(crate) type NameMap<V> = std::collections::HashMap<String, V>;

pub use class::{ClassInfo, ClassRegistry};
pub use context::SyncContext;
pub use error::{ObjectError, ObjectResult, RankError};
pub use levels::RankLevels;
pub use model::{AsAny, ObjectModel};
pub use rank::RankResult;
pub use store::{DEFAULT_SPIN_LIMIT, ObjectEntry, ObjectState, ObjectStore, Service};
