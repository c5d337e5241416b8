//! Even partitioning of work items across workers.

use std::ops::Range;

/// Split `n_items` into contiguous ranges, one per worker.
///
/// At most `threads` ranges are produced and every range holds at least
/// `min_items` items (a floor of 0 is treated as 1).  Sizes differ by at most
/// one.  When the floor cannot be met by two workers, or threading is
/// disabled (`threads <= 1`), a single range covering everything is returned.
/// Zero items yield one empty range.
pub fn partition(n_items: usize, threads: usize, min_items: usize) -> Vec<Range<usize>> {
    let floor = min_items.max(1);
    let workers = threads.min(n_items / floor).max(1);
    if workers == 1 {
        return vec![0..n_items];
    }

    let base = n_items / workers;
    let extra = n_items % workers;
    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for k in 0..workers {
        let len = base + usize::from(k < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}
