//! Persistence seam between the engine and a durable store.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::coverage::CoverageClaim;
use crate::errors::Result;
use crate::intervals::IntervalSet;
use crate::types::{EntityId, ProviderId, SeriesRecord};

/// Outcome of one atomic commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Records upserted by this commit.
    pub records_written: usize,
    /// Coverage claims folded into stored interval sets.
    pub intervals_committed: usize,
}

/// Durable home of series records and coverage.
///
/// Implementations must make [`commit`](Self::commit) atomic: either every
/// record is upserted and every claim folded into coverage, or neither
/// happens. Commits touching the same (provider, entity) must be
/// serialized so the stored interval sets stay coalesced under concurrent
/// tasks. Coverage reads are synchronous; they run once per request, off
/// the hot path.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Covered intervals for one (provider, entity). Empty if the pair was
    /// never fetched.
    fn coverage(&self, provider_id: &ProviderId, entity: &EntityId) -> Result<IntervalSet>;

    /// Batch coverage lookup; the default loops over [`coverage`](Self::coverage).
    ///
    /// Every requested entity appears in the result, unfetched ones with an
    /// empty set.
    fn coverage_many(
        &self,
        provider_id: &ProviderId,
        entities: &[EntityId],
    ) -> Result<HashMap<EntityId, IntervalSet>> {
        let mut map = HashMap::with_capacity(entities.len());
        for entity in entities {
            map.insert(entity.clone(), self.coverage(provider_id, entity)?);
        }
        Ok(map)
    }

    /// Atomically upserts `records` and extends coverage with `claims`.
    ///
    /// An empty record batch with non-empty claims is valid and must still
    /// advance coverage: the provider confirmed the range holds no data.
    async fn commit(
        &self,
        provider_id: &ProviderId,
        claims: &[CoverageClaim],
        records: Vec<SeriesRecord>,
    ) -> Result<CommitReceipt>;
}
