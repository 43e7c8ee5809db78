//! Ordered, disjoint, coalesced interval collection.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Interval;

/// Sorted set of disjoint, non-adjacent half-open intervals.
///
/// Two invariants hold after every mutation:
/// 1. intervals are sorted ascending by start;
/// 2. no two stored intervals overlap or are adjacent.
///
/// [`insert`](Self::insert) maintains them by coalescing, which keeps the
/// set canonical: two sets covering the same instants are always equal.
/// Lookups and [`subtract`](Self::subtract) binary-search the start
/// position, so a query touching `k` stored intervals costs O(log n + k).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Interval>", into = "Vec<Interval>")]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an interval, coalescing with every overlapping or adjacent
    /// neighbour.
    pub fn insert(&mut self, interval: Interval) {
        // Everything before `lo` ends strictly before the new interval
        // starts, so `lo` is the first candidate that could touch it.
        let lo = self
            .intervals
            .partition_point(|stored| stored.end() < interval.start());
        let mut hi = lo;
        while hi < self.intervals.len() && self.intervals[hi].start() <= interval.end() {
            hi += 1;
        }
        if lo == hi {
            self.intervals.insert(lo, interval);
            return;
        }
        let merged = self.intervals[lo..hi]
            .iter()
            .fold(interval, |acc, stored| acc.merge(stored));
        self.intervals.splice(lo..hi, std::iter::once(merged));
    }

    /// Sub-intervals of `request` not present in the set, ascending.
    ///
    /// The result is disjoint and non-adjacent by construction. An empty
    /// result means the request is fully covered.
    pub fn subtract(&self, request: &Interval) -> Vec<Interval> {
        let mut gaps = Vec::new();
        let mut cursor = request.start();
        let mut idx = self
            .intervals
            .partition_point(|stored| stored.end() <= request.start());
        while idx < self.intervals.len() && self.intervals[idx].start() < request.end() {
            let stored = &self.intervals[idx];
            if stored.start() > cursor {
                gaps.push(Interval::new_unchecked(cursor, stored.start()));
            }
            cursor = cursor.max(stored.end());
            if cursor >= request.end() {
                return gaps;
            }
            idx += 1;
        }
        if cursor < request.end() {
            gaps.push(Interval::new_unchecked(cursor, request.end()));
        }
        gaps
    }

    /// True when `interval` is entirely contained in the set.
    ///
    /// Because the set is coalesced, containment can only come from a
    /// single stored interval.
    pub fn covers(&self, interval: &Interval) -> bool {
        let idx = self
            .intervals
            .partition_point(|stored| stored.end() < interval.end());
        match self.intervals.get(idx) {
            Some(stored) => stored.encloses(interval),
            None => false,
        }
    }

    /// True when `instant` falls inside any stored interval.
    pub fn contains(&self, instant: chrono::DateTime<chrono::Utc>) -> bool {
        let idx = self
            .intervals
            .partition_point(|stored| stored.end() <= instant);
        self.intervals
            .get(idx)
            .is_some_and(|stored| stored.contains(instant))
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of stored (coalesced) intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }

    /// Summed length of all stored intervals.
    pub fn total_duration(&self) -> Duration {
        self.intervals
            .iter()
            .fold(Duration::zero(), |acc, stored| acc + stored.duration())
    }

    /// Smallest single interval containing the whole set.
    pub fn bounding(&self) -> Option<Interval> {
        match (self.intervals.first(), self.intervals.last()) {
            (Some(first), Some(last)) => {
                Some(Interval::new_unchecked(first.start(), last.end()))
            }
            _ => None,
        }
    }

    /// Union with another set, coalesced.
    pub fn union(&self, other: &IntervalSet) -> IntervalSet {
        let mut out = self.clone();
        for interval in other.iter() {
            out.insert(*interval);
        }
        out
    }
}

impl From<Vec<Interval>> for IntervalSet {
    fn from(intervals: Vec<Interval>) -> Self {
        let mut set = IntervalSet::new();
        for interval in intervals {
            set.insert(interval);
        }
        set
    }
}

impl From<IntervalSet> for Vec<Interval> {
    fn from(set: IntervalSet) -> Self {
        set.intervals
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        let mut set = IntervalSet::new();
        for interval in iter {
            set.insert(interval);
        }
        set
    }
}

impl Extend<Interval> for IntervalSet {
    fn extend<I: IntoIterator<Item = Interval>>(&mut self, iter: I) {
        for interval in iter {
            self.insert(interval);
        }
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, interval) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", interval)?;
        }
        write!(f, "}}")
    }
}
