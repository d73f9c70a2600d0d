use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// A compact, mergeable set of half-open intervals `[lo, hi)` over [`Position`]s.
///
/// Intervals are kept disjoint, non-empty, sorted, and coalesced: inserting a position or
/// interval that touches or overlaps an existing one merges them in place, the same discipline
/// `GuestWriteLog::record` applies to its write ranges, generalized here to a `BTreeMap` keyed by
/// interval start so lookups and insertion are logarithmic instead of linear.
///
/// Invariant upheld at every return point: no two stored intervals are adjacent or overlapping,
/// and `lo < hi` always.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RangeSet {
    intervals: BTreeMap<Position, Position>,
    cached_size: u64,
}

/// A half-open interval, used for inputs/outputs of [`RangeSet`] operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lo: Position,
    pub hi: Position,
}

impl Interval {
    pub fn new(lo: Position, hi: Position) -> Self {
        assert!(lo < hi, "range set intervals must be non-empty: [{lo}, {hi})");
        Interval { lo, hi }
    }

    /// Number of positions covered. Intervals never cross a segment boundary (merging requires
    /// exact endpoint equality, which can't happen across segments), so plain entry-id
    /// subtraction is valid.
    fn len(&self) -> u64 {
        debug_assert_eq!(self.lo.segment, self.hi.segment);
        (self.hi.entry - self.lo.entry) as u64
    }
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a single position, equivalent to `insert_interval([p, p.next()))`.
    pub fn insert(&mut self, p: Position) {
        self.insert_interval(Interval::new(p, p.next()));
    }

    /// Inserts `[lo, hi)`, merging with any overlapping or adjacent existing intervals.
    pub fn insert_interval(&mut self, interval: Interval) {
        let Interval { mut lo, mut hi } = interval;

        // Absorb the preceding interval if it touches or overlaps the new one.
        if let Some((&p_lo, &p_hi)) = self.intervals.range(..=lo).next_back() {
            if p_hi >= lo {
                lo = lo.min(p_lo);
                hi = hi.max(p_hi);
                self.cached_size -= Interval::new(p_lo, p_hi).len();
                self.intervals.remove(&p_lo);
            }
        }

        // Absorb every following interval that the (possibly now larger) new interval reaches.
        let absorbed: Vec<Position> = self
            .intervals
            .range(lo..)
            .take_while(|(&next_lo, _)| next_lo <= hi)
            .map(|(&next_lo, _)| next_lo)
            .collect();
        for next_lo in absorbed {
            let next_hi = self.intervals.remove(&next_lo).expect("just matched");
            hi = hi.max(next_hi);
            self.cached_size -= Interval::new(next_lo, next_hi).len();
        }

        self.cached_size += Interval::new(lo, hi).len();
        self.intervals.insert(lo, hi);
    }

    pub fn contains(&self, p: Position) -> bool {
        self.intervals
            .range(..=p)
            .next_back()
            .is_some_and(|(_, &hi)| p < hi)
    }

    /// Total number of positions covered, maintained incrementally rather than recomputed.
    pub fn size(&self) -> u64 {
        self.cached_size
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The `lo` of the lowest-sorted interval, if any.
    pub fn lowest(&self) -> Option<Interval> {
        self.intervals
            .iter()
            .next()
            .map(|(&lo, &hi)| Interval::new(lo, hi))
    }

    pub fn iter(&self) -> impl Iterator<Item = Interval> + '_ {
        self.intervals.iter().map(|(&lo, &hi)| Interval::new(lo, hi))
    }

    /// Count of positions in this set that fall within `[lo, hi)`.
    pub fn intersect_count(&self, query: Interval) -> u64 {
        self.intervals
            .range(..query.hi)
            .rev()
            .take_while(|(_, &hi)| hi > query.lo)
            .map(|(&lo, &hi)| {
                let clipped_lo = lo.max(query.lo);
                let clipped_hi = hi.min(query.hi);
                Interval::new(clipped_lo, clipped_hi).len()
            })
            .sum()
    }

    /// Drops (or truncates) every interval entirely below `p`, e.g. after `mark_delete`
    /// advances past them. Used to enforce invariant 2 of the cursor state model: every
    /// remaining interval's `lo` must exceed `p`.
    pub fn remove_below(&mut self, p: Position) {
        let below: Vec<Position> = self
            .intervals
            .range(..p)
            .map(|(&lo, _)| lo)
            .collect();
        for lo in below {
            let hi = self.intervals.remove(&lo).expect("just matched");
            if hi <= p {
                self.cached_size -= Interval::new(lo, hi).len();
            } else {
                // Straddles `p`: keep the remainder `[p, hi)`.
                self.cached_size -= Interval::new(lo, hi).len();
                self.cached_size += Interval::new(p, hi).len();
                self.intervals.insert(p, hi);
            }
        }
    }

    /// Count of positions in this set at or after `p`. Used for backlog/available-to-read
    /// counting; a straightforward linear scan over the (typically small) interval list is
    /// preferred over adding another ordered index just for this.
    pub fn count_from(&self, p: Position) -> u64 {
        self.iter()
            .filter(|i| i.hi > p)
            .map(|i| Interval::new(i.lo.max(p), i.hi).len())
            .sum()
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
        self.cached_size = 0;
    }
}
