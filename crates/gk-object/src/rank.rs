//! Rank assignor.
//!
//! # Invariant
//!
//! For every parent link and every dependency edge the upstream object ranks
//! strictly above the downstream one.  Ranks only grow.
//!
//! # Propagation
//!
//! Adding an edge raises its upstream end to `rank(downstream) + 1`.  Every
//! object whose rank changes pushes the same requirement to its own parent and
//! dependents.  The walk is an explicit-stack depth-first search; an object is
//! marked `rerank` while it sits on the current path and the mark is cleared
//! when the walk returns from it.  Reaching a marked object means the new edge
//! closed a cycle.
//!
//! Every rank change is written to an undo log first, so a rejected edge
//! restores all ranks and links exactly as they were.

use gk_core::ObjectId;
use tracing::{debug, warn};

use crate::{ObjectStore, RankError};

pub type RankResult<T> = Result<T, RankError>;

/// The edge being added, for error reports.
#[derive(Copy, Clone)]
struct Edge {
    from: ObjectId,
    to:   ObjectId,
}

impl ObjectStore {
    /// Make `parent` the parent of `child`, raising `parent` (and everything
    /// above it) over `child`.  Returns the resulting rank of `parent`.
    ///
    /// A previous parent of `child` is replaced; its rank is left as is.
    pub fn set_parent(&mut self, child: ObjectId, parent: ObjectId) -> RankResult<u32> {
        self.check(child)?;
        self.check(parent)?;
        if child == parent {
            return Err(RankError::SelfReference(child));
        }

        let old_parent = self.entries[child.index()].parent.replace(parent);
        let required = self.entries[child.index()].rank + 1;
        match self.raise(parent, required, Some(Edge { from: child, to: parent })) {
            Ok(rank) => {
                debug!(%child, %parent, rank, "parent set");
                Ok(rank)
            }
            Err(e) => {
                self.entries[child.index()].parent = old_parent;
                Err(e)
            }
        }
    }

    /// Declare that `dependent` reads `subject`, so `dependent` must rank above
    /// it.  Returns the resulting rank of `dependent`.
    pub fn set_dependent(&mut self, subject: ObjectId, dependent: ObjectId) -> RankResult<u32> {
        self.check(subject)?;
        self.check(dependent)?;
        if subject == dependent {
            return Err(RankError::SelfReference(subject));
        }

        let deps = &mut self.entries[subject.index()].dependents;
        let added = !deps.contains(&dependent);
        if added {
            deps.push(dependent);
        }
        let required = self.entries[subject.index()].rank + 1;
        match self.raise(dependent, required, Some(Edge { from: subject, to: dependent })) {
            Ok(rank) => {
                debug!(%subject, %dependent, rank, "dependency set");
                Ok(rank)
            }
            Err(e) => {
                if added {
                    self.entries[subject.index()].dependents.pop();
                }
                Err(e)
            }
        }
    }

    /// Raise `obj` to at least `rank`, propagating upward.  A request at or
    /// below the current rank changes nothing.  Returns the resulting rank.
    pub fn set_rank(&mut self, obj: ObjectId, rank: u32) -> RankResult<u32> {
        self.check(obj)?;
        let current = self.entries[obj.index()].rank;
        if rank <= current {
            return Ok(current);
        }
        self.raise(obj, rank, None)
    }

    /// Highest rank in the store, `None` if it is empty.
    pub fn max_rank(&self) -> Option<u32> {
        self.entries.iter().map(|e| e.rank).max()
    }

    fn check(&self, id: ObjectId) -> RankResult<()> {
        if id.index() < self.entries.len() { Ok(()) } else { Err(RankError::UnknownObject(id)) }
    }

    /// The `k`-th object that must rank above `id`: the parent first, then
    /// the dependents.
    fn upstream(&self, id: ObjectId, k: usize) -> Option<ObjectId> {
        let entry = &self.entries[id.index()];
        match entry.parent {
            Some(p) if k == 0 => Some(p),
            Some(_) => entry.dependents.get(k - 1).copied(),
            None => entry.dependents.get(k).copied(),
        }
    }

    fn raise(&mut self, target: ObjectId, required: u32, edge: Option<Edge>) -> RankResult<u32> {
        let edge = edge.unwrap_or(Edge { from: target, to: target });
        let mut undo: Vec<(ObjectId, u32)> = Vec::new();

        let origin_marked = edge.from != target;
        if origin_marked {
            self.entries[edge.from.index()].rerank = true;
        }
        let result = self.propagate(target, required, edge, &mut undo);
        if origin_marked {
            self.entries[edge.from.index()].rerank = false;
        }

        match result {
            Ok(()) => Ok(self.entries[target.index()].rank),
            Err(e) => {
                for &(id, rank) in undo.iter().rev() {
                    let entry = &mut self.entries[id.index()];
                    entry.rank = rank;
                    entry.rerank = false;
                }
                warn!(from = %edge.from, to = %edge.to, error = %e, "rank change rejected");
                Err(e)
            }
        }
    }

    fn propagate(
        &mut self,
        target: ObjectId,
        required: u32,
        edge: Edge,
        undo: &mut Vec<(ObjectId, u32)>,
    ) -> RankResult<()> {
        // (object, index of the next upstream link to visit)
        let mut stack: Vec<(ObjectId, usize)> = Vec::new();
        self.visit(target, required, edge, undo, &mut stack)?;

        while let Some(frame) = stack.last_mut() {
            let (id, k) = *frame;
            frame.1 += 1;
            match self.upstream(id, k) {
                Some(up) => {
                    let need = self.entries[id.index()].rank + 1;
                    self.visit(up, need, edge, undo, &mut stack)?;
                }
                None => {
                    self.entries[id.index()].rerank = false;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Raise `id` to `required` if it is below it and queue it for
    /// propagation.
    fn visit(
        &mut self,
        id: ObjectId,
        required: u32,
        edge: Edge,
        undo: &mut Vec<(ObjectId, u32)>,
        stack: &mut Vec<(ObjectId, usize)>,
    ) -> RankResult<()> {
        let limit = self.entries.len();
        let entry = &mut self.entries[id.index()];
        if entry.rerank {
            return Err(RankError::Cycle { from: edge.from, to: edge.to, object: id });
        }
        if required <= entry.rank {
            return Ok(());
        }
        if required as usize >= limit {
            return Err(RankError::RankOverflow { object: id, requested: required, limit });
        }
        undo.push((id, entry.rank));
        entry.rank = required;
        entry.rerank = true;
        stack.push((id, 0));
        Ok(())
    }
}
