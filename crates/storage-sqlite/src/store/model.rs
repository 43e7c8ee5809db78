//! Diesel row types for the sync tables.

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;

use histsync_core::errors::{PersistenceError, Result};
use histsync_core::intervals::{Interval, IntervalSet};
use histsync_core::types::{EntityId, ProviderId, SeriesRecord};

use crate::schema::{coverage, series_records};

/// One `coverage` row: a (provider, entity) pair and its interval set,
/// stored as a JSON array.
#[derive(Queryable, Insertable, Identifiable, Debug, Clone)]
#[diesel(table_name = coverage)]
#[diesel(primary_key(provider_id, entity))]
pub struct CoverageRowDb {
    pub provider_id: String,
    pub entity: String,
    pub intervals: String,
    pub updated_at: NaiveDateTime,
}

impl CoverageRowDb {
    pub fn from_set(
        provider_id: &ProviderId,
        entity: &EntityId,
        set: &IntervalSet,
    ) -> Result<Self> {
        let intervals = serde_json::to_string(set)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        Ok(Self {
            provider_id: provider_id.to_string(),
            entity: entity.to_string(),
            intervals,
            updated_at: Utc::now().naive_utc(),
        })
    }

    /// Parses the stored JSON back into a set; deserialization re-coalesces,
    /// so even a hand-edited row loads canonical.
    pub fn interval_set(&self) -> Result<IntervalSet> {
        serde_json::from_str(&self.intervals)
            .map_err(|e| PersistenceError::Serialization(e.to_string()).into())
    }
}

/// One `series_records` row. The interval columns mirror the record's
/// source interval and form the upsert key together with the ids.
#[derive(Queryable, Insertable, Identifiable, Debug, Clone)]
#[diesel(table_name = series_records)]
#[diesel(primary_key(provider_id, entity, interval_start, interval_end))]
pub struct SeriesRecordDb {
    pub provider_id: String,
    pub entity: String,
    pub interval_start: NaiveDateTime,
    pub interval_end: NaiveDateTime,
    pub payload: Vec<u8>,
    pub created_at: NaiveDateTime,
}

impl From<&SeriesRecord> for SeriesRecordDb {
    fn from(record: &SeriesRecord) -> Self {
        Self {
            provider_id: record.provider_id.to_string(),
            entity: record.entity.to_string(),
            interval_start: record.interval.start().naive_utc(),
            interval_end: record.interval.end().naive_utc(),
            payload: record.payload.clone(),
            created_at: Utc::now().naive_utc(),
        }
    }
}

impl SeriesRecordDb {
    pub fn into_domain(self) -> Result<SeriesRecord> {
        let interval = Interval::new(utc(self.interval_start), utc(self.interval_end))?;
        Ok(SeriesRecord::new(
            ProviderId::new(self.provider_id),
            EntityId::new(self.entity),
            interval,
            self.payload,
        ))
    }
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}
