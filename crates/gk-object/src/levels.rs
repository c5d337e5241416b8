//! Rank levels: objects grouped by rank, one table per pass.

use gk_core::{ObjectId, Pass, ShuffleRng};
use tracing::debug;

use crate::{ClassRegistry, ObjectError, ObjectResult, ObjectStore};

/// Objects of one pass bucketed by rank.
///
/// Only objects whose class takes part in the pass are indexed.  Inside a
/// level objects carry no order; [`RankLevels::build`] shuffles them when
/// given an RNG.
#[derive(Debug, Clone)]
pub struct RankLevels {
    pass:   Pass,
    /// `levels[r]` holds every rank-`r` object; empty ranks are kept so the
    /// index is the rank.
    levels: Vec<Vec<ObjectId>>,
    count:  usize,
}

impl RankLevels {
    /// Index `store` for `pass`.
    ///
    /// Allocation failures are reported instead of aborting.
    pub fn build(
        store: &ObjectStore,
        classes: &ClassRegistry,
        pass: Pass,
        rng: Option<&mut ShuffleRng>,
    ) -> ObjectResult<Self> {
        let n_ranks = store.max_rank().map_or(0, |r| r as usize + 1);
        let mut levels: Vec<Vec<ObjectId>> = Vec::new();
        levels
            .try_reserve_exact(n_ranks)
            .map_err(|source| ObjectError::Resource { what: "rank level table", source })?;
        levels.resize_with(n_ranks, Vec::new);

        let mut count = 0;
        for entry in store.iter() {
            if !classes.get(entry.class())?.passes().contains(pass) {
                continue;
            }
            let level = &mut levels[entry.rank() as usize];
            level
                .try_reserve(1)
                .map_err(|source| ObjectError::Resource { what: "rank level", source })?;
            level.push(entry.id());
            count += 1;
        }

        if let Some(rng) = rng {
            for level in &mut levels {
                rng.shuffle(level);
            }
        }

        debug!(%pass, ranks = n_ranks, objects = count, "rank levels built");
        Ok(Self { pass, levels, count })
    }

    pub fn pass(&self) -> Pass {
        self.pass
    }

    /// Non-empty levels in the order the pass visits them: ascending for
    /// bottom-up, descending for the top-down passes.
    pub fn in_pass_order(&self) -> Box<dyn Iterator<Item = (u32, &[ObjectId])> + '_> {
        let ranked = self
            .levels
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_empty())
            .map(|(r, l)| (r as u32, l.as_slice()));
        if self.pass.is_top_down() { Box::new(ranked.rev()) } else { Box::new(ranked) }
    }

    /// Objects of rank `rank`.
    pub fn level(&self, rank: u32) -> &[ObjectId] {
        self.levels.get(rank as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of non-empty levels.
    pub fn depth(&self) -> usize {
        self.levels.iter().filter(|l| !l.is_empty()).count()
    }

    /// Total objects indexed.
    pub fn object_count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
