//! `gk-exec` — the pass scheduler main loop of the rust_gk kernel.
//!
//! # Main loop
//!
//! ```text
//! init:  every object's init() in creation order
//! loop while no stop was requested:
//!   ① PRETOPDOWN   ranks high → low, driver thread
//!   ② BOTTOMUP     ranks low → high, each level fanned out on one shared pool
//!   ③ POSTTOPDOWN  ranks high → low, driver thread
//!      step_to = earliest hard next time of the sweep
//!      step_to == clock   → sweep again (iteration budget charged)
//!      step_to <  clock   → stopped clock (fatal)
//!   ④ delta mode   negotiate; run an episode → step_to = clock + ceil(elapsed)
//!   ⑤ floor        round step_to up to a multiple of minimum_timestep
//!      NEVER       → steady state, stop
//!      >= stop     → stop time, stop
//!   ⑥ commit       every in-service object, then advance the clock
//! finalize: every object's finalize()
//! ```
//!
//! # Cargo features
//!
//! | Feature   | Effect                                                   |
//! |-----------|----------------------------------------------------------|
//! | `fx-hash` | FxHash for the object, class and module name indexes.    |
//! | `serde`   | Serde derives on `KernelConfig` and the time types.      |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use gk_core::{KernelConfig, PassConfig};
//! use gk_exec::{ExecBuilder, NoopObserver};
//!
//! let mut b = ExecBuilder::new(KernelConfig::default());
//! let meter = b.register_class("meter", PassConfig::BOTTOMUP, Meter::default)?;
//! b.create(meter, Some("m1"))?;
//! let summary = b.build()?.run(&mut NoopObserver)?;
//! ```

pub mod builder;
pub mod error;
pub mod exec;
pub mod interrupt;
pub mod observer;
pub mod profile;
pub mod sync;


pub use builder::ExecBuilder;
pub use error::{ErrorKind, ExecError, ExecResult};
pub use exec::{Exec, ExecSummary, RunEnd, StepEnd};
pub use interrupt::StopHandle;
pub use observer::{ExecObserver, NoopObserver};
pub use profile::{ClassProfile, ExecProfile};
pub use sync::{SyncFailure, SyncState};
