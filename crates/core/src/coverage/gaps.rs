//! Gap computation: subtract coverage from a requested window.

use std::collections::{BTreeMap, HashMap};

use crate::intervals::{Interval, IntervalSet};
use crate::types::EntityId;

/// Per-entity uncovered sub-intervals of one request window.
///
/// Only entities with at least one gap appear. Entries iterate in entity
/// order and each entity's gaps are sorted, disjoint and non-adjacent, so
/// plans built from a `GapSet` are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapSet {
    gaps: BTreeMap<EntityId, Vec<Interval>>,
}

impl GapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subtracts each entity's covered set from `window`.
    ///
    /// Entities absent from `coverage` are treated as fully uncovered.
    /// Costs O(log n + k) per entity on top of the coverage lookup itself.
    pub fn compute(
        coverage: &HashMap<EntityId, IntervalSet>,
        entities: &[EntityId],
        window: &Interval,
    ) -> GapSet {
        let empty = IntervalSet::new();
        let mut gaps = BTreeMap::new();
        for entity in entities {
            let covered = coverage.get(entity).unwrap_or(&empty);
            let missing = covered.subtract(window);
            if !missing.is_empty() {
                gaps.insert(entity.clone(), missing);
            }
        }
        GapSet { gaps }
    }

    /// Adds gaps for one entity, normalizing them to sorted disjoint form.
    /// Entities with no gaps are not stored.
    pub fn insert(&mut self, entity: EntityId, intervals: impl IntoIterator<Item = Interval>) {
        let normalized: IntervalSet = intervals.into_iter().collect();
        if !normalized.is_empty() {
            self.gaps.insert(entity, normalized.as_slice().to_vec());
        }
    }

    /// True when every entity is fully covered; nothing to fetch.
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Entities with at least one gap.
    pub fn entity_count(&self) -> usize {
        self.gaps.len()
    }

    /// Total gap intervals across all entities.
    pub fn gap_count(&self) -> usize {
        self.gaps.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Vec<Interval>)> {
        self.gaps.iter()
    }

    pub fn gaps_for(&self, entity: &EntityId) -> Option<&[Interval]> {
        self.gaps.get(entity).map(Vec::as_slice)
    }

    /// Union of all gaps across entities, coalesced.
    pub fn union_all(&self) -> IntervalSet {
        let mut union = IntervalSet::new();
        for intervals in self.gaps.values() {
            for interval in intervals {
                union.insert(*interval);
            }
        }
        union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 0, 0, 0).unwrap()
    }

    fn iv(a: u32, b: u32) -> Interval {
        Interval::new(ts(a), ts(b)).unwrap()
    }

    fn entity(name: &str) -> EntityId {
        EntityId::new(name)
    }

    fn coverage_of(pairs: &[(&str, &[(u32, u32)])]) -> HashMap<EntityId, IntervalSet> {
        pairs
            .iter()
            .map(|(name, intervals)| {
                (
                    entity(name),
                    intervals.iter().map(|&(a, b)| iv(a, b)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_uncovered_entity_gets_whole_window() {
        let coverage = HashMap::new();
        let gaps = GapSet::compute(&coverage, &[entity("A")], &iv(1, 10));
        assert_eq!(gaps.gaps_for(&entity("A")), Some(&[iv(1, 10)][..]));
    }

    #[test]
    fn test_fully_covered_entity_is_omitted() {
        let coverage = coverage_of(&[("A", &[(1, 20)])]);
        let gaps = GapSet::compute(&coverage, &[entity("A")], &iv(2, 10));
        assert!(gaps.is_empty());
        assert_eq!(gaps.gaps_for(&entity("A")), None);
    }

    #[test]
    fn test_partial_coverage_yields_holes() {
        let coverage = coverage_of(&[("A", &[(3, 5), (7, 9)])]);
        let gaps = GapSet::compute(&coverage, &[entity("A")], &iv(1, 10));
        assert_eq!(
            gaps.gaps_for(&entity("A")),
            Some(&[iv(1, 3), iv(5, 7), iv(9, 10)][..])
        );
        assert_eq!(gaps.gap_count(), 3);
    }

    #[test]
    fn test_mixed_entities() {
        let coverage = coverage_of(&[("covered", &[(1, 10)]), ("partial", &[(1, 5)])]);
        let entities = [entity("covered"), entity("partial"), entity("fresh")];
        let gaps = GapSet::compute(&coverage, &entities, &iv(1, 10));

        assert_eq!(gaps.entity_count(), 2);
        assert_eq!(gaps.gaps_for(&entity("partial")), Some(&[iv(5, 10)][..]));
        assert_eq!(gaps.gaps_for(&entity("fresh")), Some(&[iv(1, 10)][..]));
    }

    #[test]
    fn test_gaps_union_coverage_spans_request() {
        // For each entity: gaps `∪` coverage must contain the window, and
        // gaps must not intersect coverage.
        let coverage = coverage_of(&[("A", &[(2, 4), (6, 8)])]);
        let window = iv(1, 10);
        let gaps = GapSet::compute(&coverage, &[entity("A")], &window);

        let mut reunion = coverage[&entity("A")].clone();
        for gap in gaps.gaps_for(&entity("A")).unwrap() {
            for stored in coverage[&entity("A")].iter() {
                assert!(!gap.overlaps(stored));
            }
            reunion.insert(*gap);
        }
        assert!(reunion.covers(&window));
    }

    #[test]
    fn test_second_pass_finds_no_gaps() {
        // Simulates a completed run: fold the gaps into coverage, recompute.
        let mut coverage = coverage_of(&[("A", &[(3, 6)])]);
        let window = iv(1, 10);
        let first = GapSet::compute(&coverage, &[entity("A")], &window);
        assert!(!first.is_empty());

        let set = coverage.get_mut(&entity("A")).unwrap();
        for gap in first.gaps_for(&entity("A")).unwrap() {
            set.insert(*gap);
        }
        let second = GapSet::compute(&coverage, &[entity("A")], &window);
        assert!(second.is_empty());
    }

    #[test]
    fn test_union_all_coalesces_across_entities() {
        let mut gaps = GapSet::new();
        gaps.insert(entity("A"), [iv(1, 3)]);
        gaps.insert(entity("B"), [iv(3, 5), iv(8, 9)]);
        let union = gaps.union_all();
        assert_eq!(union.as_slice(), &[iv(1, 5), iv(8, 9)]);
    }

    #[test]
    fn test_insert_normalizes() {
        let mut gaps = GapSet::new();
        gaps.insert(entity("A"), [iv(5, 7), iv(1, 3), iv(3, 5)]);
        assert_eq!(gaps.gaps_for(&entity("A")), Some(&[iv(1, 7)][..]));

        gaps.insert(entity("B"), []);
        assert_eq!(gaps.entity_count(), 1);
    }
}
