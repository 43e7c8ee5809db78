//! In-memory [`SyncStore`] used by tests and single-shot runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::coverage::store::{CommitReceipt, SyncStore};
use crate::coverage::CoverageClaim;
use crate::errors::Result;
use crate::intervals::IntervalSet;
use crate::types::{EntityId, ProviderId, SeriesRecord};

type CoverageKey = (ProviderId, EntityId);
type RecordKey = (ProviderId, EntityId, DateTime<Utc>, DateTime<Utc>);

/// DashMap-backed store with no durability.
///
/// Records are keyed by (provider, entity, interval), which makes the
/// upsert idempotent, and each entity's coverage set is mutated under its
/// shard lock so concurrent commits keep it coalesced.
#[derive(Debug, Default)]
pub struct MemorySyncStore {
    coverage: DashMap<CoverageKey, IntervalSet>,
    records: DashMap<RecordKey, SeriesRecord>,
}

impl MemorySyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records stored, across all providers.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Stored records for one (provider, entity), ordered by interval start.
    pub fn records_for(&self, provider_id: &ProviderId, entity: &EntityId) -> Vec<SeriesRecord> {
        let mut records: Vec<SeriesRecord> = self
            .records
            .iter()
            .filter(|kv| &kv.key().0 == provider_id && &kv.key().1 == entity)
            .map(|kv| kv.value().clone())
            .collect();
        records.sort_by_key(|record| record.interval.start());
        records
    }
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    fn coverage(&self, provider_id: &ProviderId, entity: &EntityId) -> Result<IntervalSet> {
        Ok(self
            .coverage
            .get(&(provider_id.clone(), entity.clone()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn commit(
        &self,
        provider_id: &ProviderId,
        claims: &[CoverageClaim],
        records: Vec<SeriesRecord>,
    ) -> Result<CommitReceipt> {
        let records_written = records.len();
        for record in records {
            let key = (
                record.provider_id.clone(),
                record.entity.clone(),
                record.interval.start(),
                record.interval.end(),
            );
            self.records.insert(key, record);
        }
        for claim in claims {
            self.coverage
                .entry((provider_id.clone(), claim.entity.clone()))
                .or_default()
                .insert(claim.interval);
        }
        Ok(CommitReceipt {
            records_written,
            intervals_committed: claims.len(),
        })
    }
}
