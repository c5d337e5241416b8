//! The `Module` trait and the module registry.

use std::fmt;

use gk_core::{DeltaStep, Dt, ModuleId, Timestamp, Vote};
use tracing::debug;

use crate::{DeltaError, DeltaResult, ModuleError, NameMap};

/// A module's answer to "do you want continuous time, and how fine?".
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DeltaDesired {
    /// No continuous time needed.
    Infinite,
    /// The module cannot answer; fatal.
    Invalid,
    /// Continuous time with sub-steps no wider than this.
    Step(Dt),
}

/// An independently authored plugin that takes part in delta-mode episodes.
///
/// Modules are called on the driver thread only, in update order.
pub trait Module: Send + 'static {
    fn name(&self) -> &str;

    /// `false` keeps the module out of every episode.
    fn delta_capable(&self) -> bool {
        true
    }

    /// Polled after every discrete step.
    fn deltadesired(&mut self, clock: Timestamp) -> DeltaDesired;

    /// Called before each sub-step.  Returns the widest sub-step the module
    /// accepts; zero counts as failure.
    fn preupdate(&mut self, _clock: Timestamp, _elapsed: Dt) -> Result<Dt, ModuleError> {
        Ok(Dt(u64::MAX))
    }

    /// Called after the object updates of each sub-step iteration.
    fn interupdate(&mut self, _step: DeltaStep) -> Vote {
        Vote::Event
    }

    /// Called once when the episode ends.
    fn postupdate(&mut self, _clock: Timestamp, _elapsed: Dt) -> Result<(), ModuleError> {
        Ok(())
    }
}

// ── ModuleRegistry ────────────────────────────────────────────────────────────

/// Every module of one kernel in registration order.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
    by_name: NameMap<ModuleId>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: impl Module) -> DeltaResult<ModuleId> {
        let name = module.name().to_owned();
        if self.by_name.contains_key(&name) {
            return Err(DeltaError::DuplicateModule(name));
        }
        let id = ModuleId::try_from(self.modules.len()).map_err(|_| DeltaError::Capacity)?;
        debug!(module = %name, %id, capable = module.delta_capable(), "module registered");
        self.modules.push(Box::new(module));
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: ModuleId) -> Option<&dyn Module> {
        self.modules.get(id.index()).map(|m| &**m)
    }

    pub fn get_mut(&mut self, id: ModuleId) -> Option<&mut (dyn Module + 'static)> {
        self.modules.get_mut(id.index()).map(|m| &mut **m)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name())
    }

    /// Update order: the modules named in `preferred` first, in that order,
    /// then every other module in registration order.  Repeated names count
    /// once; unknown names are an error.
    pub fn update_order(&self, preferred: &[String]) -> DeltaResult<Vec<ModuleId>> {
        let mut order = Vec::with_capacity(self.modules.len());
        let mut placed = vec![false; self.modules.len()];
        for name in preferred {
            let id = self.find(name).ok_or_else(|| DeltaError::UnknownModule(name.clone()))?;
            if !placed[id.index()] {
                placed[id.index()] = true;
                order.push(id);
            }
        }
        for (k, done) in placed.iter().enumerate() {
            if !done {
                order.push(ModuleId(k as u16));
            }
        }
        Ok(order)
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
