//! Unit tests for gk-object.

use gk_core::{NextTime, ObjectId, Pass, PassConfig, ShuffleRng, Timestamp};

use crate::{
    ClassRegistry, ObjectError, ObjectModel, ObjectResult, ObjectStore, RankError, RankLevels,
    Service, SyncContext,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Reports a fixed value; enough to exercise the arena.
#[derive(Default)]
struct Gauge {
    value: i64,
}

impl ObjectModel for Gauge {
    fn sync(&mut self, _pass: Pass, _t: Timestamp, _ctx: &SyncContext<'_>) -> ObjectResult<NextTime> {
        Ok(NextTime::Never)
    }
}

struct Other;

impl ObjectModel for Other {
    fn sync(&mut self, _pass: Pass, _t: Timestamp, _ctx: &SyncContext<'_>) -> ObjectResult<NextTime> {
        Ok(NextTime::Never)
    }
}

fn registry() -> ClassRegistry {
    let mut classes = ClassRegistry::new();
    classes.register("gauge", PassConfig::ALL, Gauge::default).unwrap();
    classes.register("bottom_only", PassConfig::BOTTOMUP, Gauge::default).unwrap();
    classes
}

/// A store with `n` unnamed gauges.
fn store_with(n: usize) -> (ClassRegistry, ObjectStore, Vec<ObjectId>) {
    let classes = registry();
    let class = classes.find("gauge").unwrap();
    let mut store = ObjectStore::default();
    let ids = (0..n).map(|_| store.create(&classes, class, None).unwrap()).collect();
    (classes, store, ids)
}

fn ranks(store: &ObjectStore) -> Vec<u32> {
    store.iter().map(|e| e.rank()).collect()
}

// ── Classes ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod classes {
    use super::*;

    #[test]
    fn register_and_find() {
        let classes = registry();
        assert_eq!(classes.len(), 2);
        let id = classes.find("bottom_only").unwrap();
        let info = classes.get(id).unwrap();
        assert_eq!(info.name(), "bottom_only");
        assert!(info.passes().contains(Pass::BottomUp));
        assert!(!info.passes().contains(Pass::PreTopDown));
    }

    #[test]
    fn duplicate_class_rejected() {
        let mut classes = registry();
        let err = classes.register("gauge", PassConfig::NONE, Gauge::default).unwrap_err();
        assert!(matches!(err, ObjectError::DuplicateClass(ref n) if n == "gauge"));
    }

    #[test]
    fn force_name_flag() {
        let mut classes = registry();
        let id = classes.find("gauge").unwrap();
        assert!(!classes.get(id).unwrap().force_name());
        classes.set_force_name(id, true).unwrap();
        assert!(classes.get(id).unwrap().force_name());
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod store {
    use super::*;

    #[test]
    fn create_assigns_sequential_ids() {
        let (_, store, ids) = store_with(3);
        assert_eq!(ids, vec![ObjectId(0), ObjectId(1), ObjectId(2)]);
        assert_eq!(store.len(), 3);
        assert!(store.iter().all(|e| e.rank() == 0 && e.parent().is_none()));
    }

    #[test]
    fn names_are_unique_and_indexed() {
        let classes = registry();
        let class = classes.find("gauge").unwrap();
        let mut store = ObjectStore::default();
        let a = store.create(&classes, class, Some("feeder")).unwrap();
        assert_eq!(store.find("feeder"), Some(a));
        assert_eq!(store.get(a).unwrap().label(), "feeder");
        assert!(matches!(
            store.create(&classes, class, Some("feeder")),
            Err(ObjectError::DuplicateName(_))
        ));
        let b = store.create(&classes, class, None).unwrap();
        assert_eq!(store.get(b).unwrap().label(), "object:1");
    }

    #[test]
    fn service_window() {
        let (_, mut store, ids) = store_with(1);
        store.set_service_window(ids[0], Timestamp(10), Timestamp(20)).unwrap();
        let e = store.get(ids[0]).unwrap();
        assert_eq!(e.service_at(Timestamp(5)), Service::Before(Timestamp(10)));
        assert_eq!(e.service_at(Timestamp(10)), Service::In);
        assert_eq!(e.service_at(Timestamp(19)), Service::In);
        assert_eq!(e.service_at(Timestamp(20)), Service::After);
        assert!(matches!(
            store.set_service_window(ids[0], Timestamp(5), Timestamp(5)),
            Err(ObjectError::InvalidServiceWindow { .. })
        ));
    }

    #[test]
    fn typed_read_and_write() {
        let (_, store, ids) = store_with(1);
        store.write::<Gauge, _>(ids[0], |g| g.value = 42).unwrap();
        assert_eq!(store.read::<Gauge, _>(ids[0], |g| g.value).unwrap(), 42);
        assert!(matches!(
            store.read::<Other, _>(ids[0], |_| ()),
            Err(ObjectError::TypeMismatch { .. })
        ));
        assert!(store.lock_stats().acquisitions() >= 3);
    }

    #[test]
    fn unknown_object() {
        let (_, store, _) = store_with(1);
        assert!(matches!(store.get(ObjectId(9)), Err(ObjectError::UnknownObject(ObjectId(9)))));
    }

    #[test]
    fn recalc_flag_is_taken_once() {
        let (_, store, ids) = store_with(1);
        let e = store.get(ids[0]).unwrap();
        assert!(!e.take_recalc());
        e.mark_recalc();
        assert!(e.needs_recalc());
        assert!(e.take_recalc());
        assert!(!e.needs_recalc());
    }

    #[test]
    fn delta_enrolment() {
        let (_, mut store, ids) = store_with(3);
        store.enable_delta_mode(ids[2]).unwrap();
        assert_eq!(store.delta_objects(), vec![ids[2]]);
        assert!(!store.take_delta_request());
        store.request_delta_mode();
        assert!(store.take_delta_request());
        assert!(!store.take_delta_request());
    }
}

// ── Rank assignor ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod rank {
    use super::*;

    #[test]
    fn parent_ranks_above_child() {
        let (_, mut store, ids) = store_with(3);
        store.set_parent(ids[0], ids[1]).unwrap();
        store.set_parent(ids[1], ids[2]).unwrap();
        assert_eq!(ranks(&store), vec![0, 1, 2]);
        assert_eq!(store.get(ids[0]).unwrap().parent(), Some(ids[1]));
    }

    #[test]
    fn raise_propagates_up_the_chain() {
        let (_, mut store, ids) = store_with(4);
        // Chain 1 -> 2 -> 3 first, then put 0 under 1.
        store.set_parent(ids[1], ids[2]).unwrap();
        store.set_parent(ids[2], ids[3]).unwrap();
        store.set_parent(ids[0], ids[1]).unwrap();
        assert_eq!(ranks(&store), vec![0, 1, 2, 3]);
    }

    #[test]
    fn dependency_edges_propagate() {
        let (_, mut store, ids) = store_with(4);
        store.set_dependent(ids[1], ids[2]).unwrap();
        store.set_parent(ids[2], ids[3]).unwrap();
        store.set_dependent(ids[0], ids[1]).unwrap();
        for (lo, hi) in [(0, 1), (1, 2), (2, 3)] {
            assert!(store.get(ids[hi]).unwrap().rank() > store.get(ids[lo]).unwrap().rank());
        }
        assert_eq!(store.get(ids[1]).unwrap().dependents(), &[ids[2]]);
    }

    #[test]
    fn every_edge_holds_on_random_dag() {
        let n = 60;
        let (_, mut store, ids) = store_with(n);
        let mut rng = ShuffleRng::new(7);
        let mut order: Vec<usize> = (0..n).collect();
        rng.shuffle(&mut order);
        // Edges only from earlier to later positions of a random order: acyclic.
        let mut edges = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if (i * 31 + j * 17) % 7 == 0 {
                    edges.push((ids[order[i]], ids[order[j]]));
                }
            }
        }
        for &(lo, hi) in &edges {
            store.set_dependent(lo, hi).unwrap();
        }
        for &(lo, hi) in &edges {
            assert!(store.get(hi).unwrap().rank() > store.get(lo).unwrap().rank(), "{lo} -> {hi}");
        }
        assert!(store.iter().all(|e| (e.rank() as usize) < n));
    }

    #[test]
    fn two_object_parent_cycle_rejected_without_damage() {
        let (_, mut store, ids) = store_with(5);
        store.set_parent(ids[0], ids[1]).unwrap();
        let before = ranks(&store);

        let err = store.set_parent(ids[1], ids[0]).unwrap_err();
        assert!(matches!(err, RankError::Cycle { object, .. } if object == ids[1]));
        assert_eq!(ranks(&store), before);
        assert_eq!(store.get(ids[1]).unwrap().parent(), None);
        assert!(store.iter().all(|e| !e.rerank));
    }

    #[test]
    fn long_cycle_rolls_back_every_rank() {
        let (_, mut store, ids) = store_with(20);
        for k in 0..4 {
            store.set_parent(ids[k], ids[k + 1]).unwrap();
        }
        store.set_dependent(ids[5], ids[6]).unwrap();
        let before = ranks(&store);

        let err = store.set_dependent(ids[4], ids[0]).unwrap_err();
        assert!(matches!(err, RankError::Cycle { object, .. } if object == ids[4]));
        assert_eq!(ranks(&store), before);
        assert!(store.get(ids[4]).unwrap().dependents().is_empty());
        assert!(store.iter().all(|e| !e.rerank));

        // The store is still usable.
        store.set_parent(ids[4], ids[5]).unwrap();
        assert!(store.get(ids[5]).unwrap().rank() > store.get(ids[4]).unwrap().rank());
    }

    #[test]
    fn self_and_unknown_references() {
        let (_, mut store, ids) = store_with(2);
        assert!(matches!(store.set_parent(ids[0], ids[0]), Err(RankError::SelfReference(_))));
        assert!(matches!(store.set_dependent(ids[1], ids[1]), Err(RankError::SelfReference(_))));
        assert!(matches!(store.set_parent(ids[0], ObjectId(5)), Err(RankError::UnknownObject(_))));
        assert!(matches!(store.set_rank(ObjectId(5), 1), Err(RankError::UnknownObject(_))));
    }

    #[test]
    fn set_rank_raises_only() {
        let (_, mut store, ids) = store_with(4);
        store.set_parent(ids[0], ids[1]).unwrap();
        assert_eq!(store.set_rank(ids[0], 2).unwrap(), 2);
        assert_eq!(store.get(ids[1]).unwrap().rank(), 3);
        assert_eq!(store.set_rank(ids[0], 1).unwrap(), 2);
        assert_eq!(store.get(ids[0]).unwrap().rank(), 2);
    }

    #[test]
    fn rank_beyond_object_count_rejected() {
        let (_, mut store, ids) = store_with(3);
        let err = store.set_rank(ids[0], 3).unwrap_err();
        assert!(matches!(err, RankError::RankOverflow { requested: 3, limit: 3, .. }));
        assert_eq!(ranks(&store), vec![0, 0, 0]);
    }

    #[test]
    fn overflow_during_propagation_rolls_back() {
        let (_, mut store, ids) = store_with(3);
        store.set_parent(ids[0], ids[1]).unwrap();
        // Raising 0 to 2 would push 1 to 3, past the bound.
        assert!(store.set_rank(ids[0], 2).is_err());
        assert_eq!(ranks(&store), vec![0, 1, 0]);
    }

    #[test]
    fn replacing_a_parent_keeps_ranks() {
        let (_, mut store, ids) = store_with(3);
        store.set_parent(ids[0], ids[1]).unwrap();
        store.set_parent(ids[0], ids[2]).unwrap();
        assert_eq!(store.get(ids[0]).unwrap().parent(), Some(ids[2]));
        assert_eq!(ranks(&store), vec![0, 1, 1]);
    }
}

// ── Rank levels ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod levels {
    use super::*;

    #[test]
    fn levels_follow_pass_direction() {
        let (classes, mut store, ids) = store_with(3);
        store.set_parent(ids[0], ids[1]).unwrap();
        store.set_parent(ids[1], ids[2]).unwrap();

        let up = RankLevels::build(&store, &classes, Pass::BottomUp, None).unwrap();
        let order: Vec<u32> = up.in_pass_order().map(|(r, _)| r).collect();
        assert_eq!(order, vec![0, 1, 2]);

        let down = RankLevels::build(&store, &classes, Pass::PostTopDown, None).unwrap();
        let order: Vec<u32> = down.in_pass_order().map(|(r, _)| r).collect();
        assert_eq!(order, vec![2, 1, 0]);
        assert_eq!(down.level(2), &[ids[2]]);
    }

    #[test]
    fn only_participating_classes_are_indexed() {
        let classes = registry();
        let all = classes.find("gauge").unwrap();
        let bottom = classes.find("bottom_only").unwrap();
        let mut store = ObjectStore::default();
        let a = store.create(&classes, all, None).unwrap();
        let b = store.create(&classes, bottom, None).unwrap();

        let pre = RankLevels::build(&store, &classes, Pass::PreTopDown, None).unwrap();
        assert_eq!(pre.level(0), &[a]);
        let up = RankLevels::build(&store, &classes, Pass::BottomUp, None).unwrap();
        assert_eq!(up.object_count(), 2);
        assert!(up.level(0).contains(&b));
    }

    #[test]
    fn shuffle_is_seeded_and_preserves_membership() {
        let (classes, store, ids) = store_with(40);
        let build = |seed| {
            let mut rng = ShuffleRng::new(seed);
            RankLevels::build(&store, &classes, Pass::BottomUp, Some(&mut rng)).unwrap()
        };
        let a = build(3);
        let b = build(3);
        assert_eq!(a.level(0), b.level(0));

        let mut members = a.level(0).to_vec();
        members.sort();
        assert_eq!(members, ids);
    }

    #[test]
    fn empty_store() {
        let classes = registry();
        let store = ObjectStore::default();
        let levels = RankLevels::build(&store, &classes, Pass::BottomUp, None).unwrap();
        assert!(levels.is_empty());
        assert_eq!(levels.depth(), 0);
        assert_eq!(levels.in_pass_order().count(), 0);
    }
}

// ── SyncContext ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod context {
    use super::*;

    #[test]
    fn cross_object_access() {
        let (_, mut store, ids) = store_with(2);
        store.set_parent(ids[0], ids[1]).unwrap();
        let ctx = SyncContext::new(&store, ids[0], Timestamp(5));
        assert_eq!(ctx.parent(), Some(ids[1]));
        assert_eq!(ctx.clock(), Timestamp(5));

        ctx.write::<Gauge, _>(ids[1], |g| g.value = 7).unwrap();
        assert_eq!(ctx.read::<Gauge, _>(ids[1], |g| g.value).unwrap(), 7);
        assert!(matches!(ctx.read::<Gauge, _>(ids[0], |g| g.value), Err(ObjectError::SelfAccess(_))));
    }

    #[test]
    fn mark_recalc_and_delta_request() {
        let (_, store, ids) = store_with(2);
        let ctx = SyncContext::new(&store, ids[0], Timestamp::ZERO);
        ctx.mark_recalc(ids[1]).unwrap();
        assert!(store.get(ids[1]).unwrap().needs_recalc());
        ctx.request_delta_mode();
        assert!(store.take_delta_request());
    }

    #[test]
    fn locked_neighbour_times_out() {
        let classes = registry();
        let class = classes.find("gauge").unwrap();
        let mut store = ObjectStore::new(100);
        let a = store.create(&classes, class, None).unwrap();
        let b = store.create(&classes, class, None).unwrap();

        let _held = store.lock(b).unwrap();
        let ctx = SyncContext::new(&store, a, Timestamp::ZERO);
        assert!(matches!(ctx.read::<Gauge, _>(b, |g| g.value), Err(ObjectError::Lock { .. })));
    }
}
