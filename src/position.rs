use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A totally ordered identifier of an entry within a log: `(segment_id, entry_id)`.
///
/// `entry_id == -1` is the distinguished "before the first entry of this segment" value used as
/// the initial mark-delete position of a freshly-opened cursor. It is not an error state and
/// `next()` handles it like any other value: `(seg, -1).next() == (seg, 0)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub segment: u64,
    pub entry: i64,
}

impl Position {
    /// The position immediately preceding the first entry of `segment`.
    pub const fn segment_start(segment: u64) -> Self {
        Position {
            segment,
            entry: -1,
        }
    }

    pub const fn new(segment: u64, entry: i64) -> Self {
        Position { segment, entry }
    }

    /// The position of the entry immediately following this one, within the same segment.
    ///
    /// Segment rollover is resolved lazily by the log view, not here: a position algebra value
    /// has no notion of "segment N has no entry M", only ordering.
    pub const fn next(self) -> Self {
        Position {
            segment: self.segment,
            entry: self.entry + 1,
        }
    }

    /// The position immediately preceding this one. Only meaningful when `entry > -1`.
    pub const fn prev(self) -> Self {
        Position {
            segment: self.segment,
            entry: self.entry - 1,
        }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.segment, self.entry).cmp(&(other.segment, other.entry))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.entry)
    }
}

/// Whether `position_after_n` counts the starting position itself as the first of the `n` live
/// entries, or starts counting strictly after it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CountBound {
    StartIncluded,
    StartExcluded,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn next_and_prev_are_inverses(segment in any::<u64>(), entry in -1i64..i64::MAX) {
            let p = Position::new(segment, entry);
            prop_assert_eq!(p.next().prev(), p);
        }

        #[test]
        fn next_is_always_strictly_greater(segment in any::<u64>(), entry in -1i64..i64::MAX) {
            let p = Position::new(segment, entry);
            prop_assert!(p.next() > p);
        }

        #[test]
        fn ordering_matches_tuple_ordering(
            s1 in any::<u64>(), e1 in any::<i64>(),
            s2 in any::<u64>(), e2 in any::<i64>(),
        ) {
            let a = Position::new(s1, e1);
            let b = Position::new(s2, e2);
            prop_assert_eq!(a.cmp(&b), (s1, e1).cmp(&(s2, e2)));
        }
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Position::new(0, 5) < Position::new(1, 0));
        assert!(Position::new(1, 0) < Position::new(1, 1));
        assert_eq!(Position::new(2, 3), Position::new(2, 3));
    }

    #[test]
    fn next_handles_before_first() {
        let before_first = Position::segment_start(4);
        assert_eq!(before_first.entry, -1);
        assert_eq!(before_first.next(), Position::new(4, 0));
    }

    #[test]
    fn prev_is_inverse_of_next() {
        let p = Position::new(7, 12);
        assert_eq!(p.next().prev(), p);
    }

    #[test]
    fn display_format() {
        assert_eq!(Position::new(3, 9).to_string(), "3:9");
    }
}
