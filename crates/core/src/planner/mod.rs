//! Merge planning: turning per-entity gaps into provider-shaped calls.
//!
//! A provider charges per query, so the planner's job is to cover every
//! gap with as few queries as possible. Two merge directions compete:
//!
//! - **time-direction**: union all gaps on the time axis and issue ranged
//!   queries covering every requested entity at once. Cheap when gaps
//!   cluster (everyone missing the same recent tail).
//! - **entity-direction**: group entities whose gaps span the same
//!   bounding range and fetch them in batches. Cheap when a few stale
//!   entities are missing long histories the rest already have.
//!
//! The cost of a direction is its predicted query count under the
//! provider's `max_records_per_query`, assuming one record per entity per
//! `native_frequency` unit. Both costs are computed (capability
//! permitting), the strictly cheaper direction is materialized, and ties
//! go to the time direction. Costing is linear in the number of gaps plus
//! the number of entities.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::coverage::{CoverageClaim, GapSet};
use crate::intervals::{Interval, IntervalSet};
use crate::provider::{FetchCapability, ProviderLimits};
use crate::types::{EntityId, ProviderId};

/// Merge axis of a planned task.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeDirection {
    ByTime,
    ByEntities,
}

impl std::fmt::Display for MergeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByTime => write!(f, "time"),
            Self::ByEntities => write!(f, "entity"),
        }
    }
}

/// One provider call the executor will dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub provider_id: ProviderId,
    pub direction: MergeDirection,
    /// Entities whose coverage this task advances. For a time-direction
    /// task this is every requested entity; for an entity-direction task,
    /// one batch.
    pub entities: Vec<EntityId>,
    pub range: Interval,
}

impl FetchTask {
    /// Coverage claims committed when this task's fetch succeeds: every
    /// task entity over the full task range. Valid even when the fetch
    /// returns no records.
    pub fn claims(&self) -> Vec<CoverageClaim> {
        self.entities
            .iter()
            .map(|entity| CoverageClaim::new(entity.clone(), self.range))
            .collect()
    }
}

/// Predicted query counts for the directions that were costed.
/// `None` means the provider's capability rules the direction out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanCost {
    pub by_time: Option<usize>,
    pub by_entities: Option<usize>,
}

/// Ordered tasks plus the costing that chose them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub provider_id: ProviderId,
    /// `None` when there was nothing to plan.
    pub direction: Option<MergeDirection>,
    pub tasks: Vec<FetchTask>,
    pub cost: PlanCost,
}

impl BatchPlan {
    fn empty(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            direction: None,
            tasks: Vec::new(),
            cost: PlanCost::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Entities grouped by the bounding `(start, end)` of their gaps.
type EntityGroups = BTreeMap<(DateTime<Utc>, DateTime<Utc>), Vec<EntityId>>;

/// Chooses and materializes the cheaper merge direction for one provider.
pub struct MergePlanner {
    provider_id: ProviderId,
    capability: FetchCapability,
    limits: ProviderLimits,
}

impl MergePlanner {
    pub fn new(provider_id: ProviderId, capability: FetchCapability, limits: ProviderLimits) -> Self {
        Self {
            provider_id,
            capability,
            limits,
        }
    }

    /// Plans provider calls covering every gap.
    ///
    /// `entities` is the full requested set; time-direction tasks claim
    /// coverage for all of them, while `gaps` only names the subset with
    /// missing data.
    pub fn plan(&self, gaps: &GapSet, entities: &[EntityId]) -> BatchPlan {
        if gaps.is_empty() || entities.is_empty() {
            return BatchPlan::empty(self.provider_id.clone());
        }

        let mut cost = PlanCost::default();
        let mut union = None;
        let mut groups = None;

        if self.capability.supports_by_time() {
            let u = gaps.union_all();
            cost.by_time = Some(self.time_cost(&u, entities.len()));
            union = Some(u);
        }
        if self.capability.supports_by_entities() {
            let g = self.entity_groups(gaps);
            cost.by_entities = Some(self.entity_cost(&g));
            groups = Some(g);
        }

        let (direction, tasks) = match (union, groups) {
            (Some(u), Some(g)) => {
                // Strictly fewer queries wins; a tie goes to the time
                // direction, where one ranged query serves every entity.
                if cost.by_entities < cost.by_time {
                    (MergeDirection::ByEntities, self.materialize_by_entities(&g))
                } else {
                    (MergeDirection::ByTime, self.materialize_by_time(&u, entities))
                }
            }
            (Some(u), None) => (MergeDirection::ByTime, self.materialize_by_time(&u, entities)),
            (None, Some(g)) => (
                MergeDirection::ByEntities,
                self.materialize_by_entities(&g),
            ),
            (None, None) => return BatchPlan::empty(self.provider_id.clone()),
        };

        debug!(
            "Planned {} {}-direction task(s) for provider '{}' (cost: time={:?} entity={:?})",
            tasks.len(),
            direction,
            self.provider_id,
            cost.by_time,
            cost.by_entities
        );

        BatchPlan {
            provider_id: self.provider_id.clone(),
            direction: Some(direction),
            tasks,
            cost,
        }
    }

    // =========================================================================
    // Cost model
    // =========================================================================

    /// Native-frequency units needed to span `interval`, rounded up, at
    /// least one.
    fn units_in(&self, interval: &Interval) -> u64 {
        let freq_ms = self.limits.native_frequency.num_milliseconds().max(1) as u64;
        let span_ms = interval.duration().num_milliseconds().max(1) as u64;
        span_ms.div_ceil(freq_ms).max(1)
    }

    /// Units a single time-direction query may span before its response
    /// (one record per entity per unit) would exceed the record cap.
    fn units_per_time_query(&self, entity_count: usize) -> u64 {
        (u64::from(self.limits.max_records_per_query) / entity_count.max(1) as u64).max(1)
    }

    /// Predicted query count for the time direction: each contiguous gap
    /// union interval split into capped windows.
    fn time_cost(&self, union: &IntervalSet, entity_count: usize) -> usize {
        let per_query = self.units_per_time_query(entity_count);
        union
            .iter()
            .map(|interval| self.units_in(interval).div_ceil(per_query) as usize)
            .sum()
    }

    /// Entities bucketed by the bounding interval of their gaps. Entities
    /// missing the same range batch into the same queries; an entity with
    /// scattered gaps is fetched over its bounding range, the already
    /// covered middle being re-claimed harmlessly.
    fn entity_groups(&self, gaps: &GapSet) -> EntityGroups {
        let mut groups = EntityGroups::new();
        for (entity, intervals) in gaps.iter() {
            if let (Some(first), Some(last)) = (intervals.first(), intervals.last()) {
                groups
                    .entry((first.start(), last.end()))
                    .or_default()
                    .push(entity.clone());
            }
        }
        groups
    }

    /// Entities per query for one group, given how many records each
    /// entity contributes over the group's bounding range.
    fn batch_size(&self, bound: &Interval) -> usize {
        let per_entity = self.units_in(bound);
        (u64::from(self.limits.max_records_per_query) / per_entity).max(1) as usize
    }

    /// Predicted query count for the entity direction.
    fn entity_cost(&self, groups: &EntityGroups) -> usize {
        groups
            .iter()
            .map(|(&(start, end), members)| {
                let bound = Interval::new_unchecked(start, end);
                members.len().div_ceil(self.batch_size(&bound))
            })
            .sum()
    }

    // =========================================================================
    // Materialization
    // =========================================================================

    fn materialize_by_time(&self, union: &IntervalSet, entities: &[EntityId]) -> Vec<FetchTask> {
        let per_query = self.units_per_time_query(entities.len());
        let chunk_ms = per_query.saturating_mul(
            self.limits.native_frequency.num_milliseconds().max(1) as u64,
        );
        let chunk = chrono::Duration::milliseconds(chunk_ms.min(i64::MAX as u64) as i64);

        let mut tasks = Vec::new();
        for interval in union.iter() {
            let mut cursor = interval.start();
            while cursor < interval.end() {
                let end = cursor
                    .checked_add_signed(chunk)
                    .map_or(interval.end(), |t| t.min(interval.end()));
                tasks.push(FetchTask {
                    provider_id: self.provider_id.clone(),
                    direction: MergeDirection::ByTime,
                    entities: entities.to_vec(),
                    range: Interval::new_unchecked(cursor, end),
                });
                cursor = end;
            }
        }
        tasks
    }

    fn materialize_by_entities(&self, groups: &EntityGroups) -> Vec<FetchTask> {
        let mut tasks = Vec::new();
        for (&(start, end), members) in groups {
            let bound = Interval::new_unchecked(start, end);
            for batch in members.chunks(self.batch_size(&bound)) {
                tasks.push(FetchTask {
                    provider_id: self.provider_id.clone(),
                    direction: MergeDirection::ByEntities,
                    entities: batch.to_vec(),
                    range: bound,
                });
            }
        }
        tasks
    }
}
