//! Qualifying participants and per-episode state.

use gk_core::{DeltaConfig, Dt, ModuleId, ObjectId};
use gk_object::ObjectStore;
use tracing::debug;

use crate::{DeltaResult, ModuleRegistry};

/// Who takes part in delta mode, and where the current episode stands.
///
/// The participant lists are built once, after the object graph is final.
/// The episode fields are reset at the start of every episode.
#[derive(Debug, Clone, Default)]
pub struct DeltaModeContext {
    /// Delta-capable modules in update order.
    pub modules:   Vec<ModuleId>,
    /// Delta-mode objects in ascending rank order.
    pub objects:   Vec<ObjectId>,
    /// Rank of each entry of `objects`.
    pub ranks:     Vec<u32>,
    /// Width of the sub-step being solved.
    pub timestep:  Dt,
    /// Continuous time consumed so far in this episode.
    pub elapsed:   Dt,
    /// Reiteration count on the current sub-step.
    pub iteration: u32,
    /// Sub-steps consumed in this episode.
    pub substeps:  u32,
}

impl DeltaModeContext {
    pub fn build(modules: &ModuleRegistry, store: &ObjectStore, config: &DeltaConfig) -> DeltaResult<Self> {
        let qualifying = modules
            .update_order(&config.module_order)?
            .into_iter()
            .filter(|&id| modules.get(id).is_some_and(|m| m.delta_capable()))
            .collect::<Vec<_>>();

        let mut ranked = store
            .delta_objects()
            .into_iter()
            .map(|id| (store.get(id).map_or(0, |e| e.rank()), id))
            .collect::<Vec<_>>();
        ranked.sort_by_key(|&(rank, _)| rank);
        let (ranks, objects): (Vec<u32>, Vec<ObjectId>) = ranked.into_iter().unzip();

        debug!(
            modules = qualifying.len(),
            objects = objects.len(),
            levels = ranks.chunk_by(|a, b| a == b).count(),
            "delta-mode participants"
        );
        Ok(Self { modules: qualifying, objects, ranks, ..Self::default() })
    }

    /// Delta objects grouped by rank, lowest rank first.
    pub fn levels(&self) -> impl Iterator<Item = (u32, &[ObjectId])> + '_ {
        let mut start = 0;
        self.ranks.chunk_by(|a, b| a == b).map(move |run| {
            let ids = &self.objects[start..start + run.len()];
            start += run.len();
            (run[0], ids)
        })
    }

    /// Clear the episode fields.
    pub fn reset(&mut self) {
        self.timestep = Dt::ZERO;
        self.elapsed = Dt::ZERO;
        self.iteration = 0;
        self.substeps = 0;
    }

    /// `true` if nothing can take part in delta mode.
    pub fn is_idle(&self) -> bool {
        self.modules.is_empty() && self.objects.is_empty()
    }
}
