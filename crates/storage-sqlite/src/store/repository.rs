//! [`SyncStore`] implementation on Diesel + SQLite.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;

use histsync_core::coverage::{CommitReceipt, CoverageClaim, SyncStore};
use histsync_core::intervals::IntervalSet;
use histsync_core::types::{EntityId, ProviderId, SeriesRecord};
use histsync_core::Result;

use super::model::{CoverageRowDb, SeriesRecordDb};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::coverage::dsl as coverage_dsl;
use crate::schema::series_records::dsl as records_dsl;

/// SQLite has a compile-time cap on bind parameters (commonly 999), so
/// `IN (...)` lists and batch inserts are split well below it.
const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

/// Rows per insert statement; a series record row binds one parameter per
/// column, so this stays inside the same budget as the `IN (...)` chunks.
const RECORD_INSERT_CHUNK: usize = SQLITE_MAX_PARAMS_CHUNK / 6;

/// Durable store backed by the shared pool for reads and the writer actor
/// for commits.
///
/// Coverage reads go straight to the pool. Commits run as one job on the
/// writer actor, whose immediate transaction makes the record upserts and
/// the coverage update atomic and serializes commits against each other,
/// keeping stored interval sets coalesced under concurrent tasks.
pub struct SqliteSyncStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteSyncStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Stored records for one (provider, entity), ordered by interval start.
    pub fn records_for(
        &self,
        provider_id: &ProviderId,
        entity: &EntityId,
    ) -> Result<Vec<SeriesRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows: Vec<SeriesRecordDb> = records_dsl::series_records
            .filter(records_dsl::provider_id.eq(provider_id.as_str()))
            .filter(records_dsl::entity.eq(entity.as_str()))
            .order(records_dsl::interval_start.asc())
            .load(&mut conn)
            .into_core()?;
        rows.into_iter().map(SeriesRecordDb::into_domain).collect()
    }
}

#[async_trait]
impl SyncStore for SqliteSyncStore {
    fn coverage(&self, provider_id: &ProviderId, entity: &EntityId) -> Result<IntervalSet> {
        let mut conn = get_connection(&self.pool)?;
        let row: Option<CoverageRowDb> = coverage_dsl::coverage
            .filter(coverage_dsl::provider_id.eq(provider_id.as_str()))
            .filter(coverage_dsl::entity.eq(entity.as_str()))
            .first(&mut conn)
            .optional()
            .into_core()?;
        match row {
            Some(row) => row.interval_set(),
            None => Ok(IntervalSet::new()),
        }
    }

    fn coverage_many(
        &self,
        provider_id: &ProviderId,
        entities: &[EntityId],
    ) -> Result<HashMap<EntityId, IntervalSet>> {
        let mut conn = get_connection(&self.pool)?;

        // Every requested entity gets an entry; rows only overwrite the
        // ones that were actually fetched before.
        let mut map: HashMap<EntityId, IntervalSet> = entities
            .iter()
            .map(|entity| (entity.clone(), IntervalSet::new()))
            .collect();

        for chunk in entities.chunks(SQLITE_MAX_PARAMS_CHUNK) {
            let names: Vec<&str> = chunk.iter().map(EntityId::as_str).collect();
            let rows: Vec<CoverageRowDb> = coverage_dsl::coverage
                .filter(coverage_dsl::provider_id.eq(provider_id.as_str()))
                .filter(coverage_dsl::entity.eq_any(&names))
                .load(&mut conn)
                .into_core()?;
            for row in rows {
                let set = row.interval_set()?;
                map.insert(EntityId::new(row.entity), set);
            }
        }
        Ok(map)
    }

    async fn commit(
        &self,
        provider_id: &ProviderId,
        claims: &[CoverageClaim],
        records: Vec<SeriesRecord>,
    ) -> Result<CommitReceipt> {
        let provider = provider_id.clone();
        let claims = claims.to_vec();
        let rows: Vec<SeriesRecordDb> = records.iter().map(SeriesRecordDb::from).collect();

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<CommitReceipt> {
                let mut records_written = 0;
                for chunk in rows.chunks(RECORD_INSERT_CHUNK) {
                    records_written += diesel::replace_into(records_dsl::series_records)
                        .values(chunk)
                        .execute(conn)
                        .into_core()?;
                }

                for claim in &claims {
                    merge_claim(conn, &provider, claim)?;
                }

                Ok(CommitReceipt {
                    records_written,
                    intervals_committed: claims.len(),
                })
            })
            .await
    }
}

/// Read-merge-write of one entity's coverage row. Runs inside the writer's
/// transaction, so the read cannot race another commit.
fn merge_claim(
    conn: &mut SqliteConnection,
    provider_id: &ProviderId,
    claim: &CoverageClaim,
) -> Result<()> {
    let existing: Option<CoverageRowDb> = coverage_dsl::coverage
        .filter(coverage_dsl::provider_id.eq(provider_id.as_str()))
        .filter(coverage_dsl::entity.eq(claim.entity.as_str()))
        .first(conn)
        .optional()
        .into_core()?;

    let mut set = match existing {
        Some(row) => row.interval_set()?,
        None => IntervalSet::new(),
    };
    set.insert(claim.interval);

    let row = CoverageRowDb::from_set(provider_id, &claim.entity, &set)?;
    diesel::replace_into(coverage_dsl::coverage)
        .values(&row)
        .execute(conn)
        .into_core()?;
    Ok(())
}
