//! Strong types for the synchronization engine.
//!
//! These types enforce clear boundaries and prevent mixing of concepts:
//! - `ProviderId` - Identifies a data provider
//! - `EntityId` - Identifies one tracked series (symbol, sensor, table)
//! - `SeriesRecord` - One fetched record with an opaque payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::intervals::Interval;

// =============================================================================
// ProviderId
// =============================================================================

/// Provider identifier.
///
/// Examples: "tushare", "flatfile", "vendor-api"
///
/// Identifies a data provider. Used for registration, storage keys and
/// rate-limiter buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// EntityId
// =============================================================================

/// Entity identifier.
///
/// Examples: "AAPL", "600519.SH", "sensor-42"
///
/// The unit of coverage tracking: every entity has its own covered interval
/// set per provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// SeriesRecord
// =============================================================================

/// One fetched data record for an entity over a sub-interval.
///
/// The payload is opaque to the engine; adapters decide its encoding and
/// downstream consumers decode it. Records are unique per
/// (provider, entity, interval) and re-fetching the same interval upserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub provider_id: ProviderId,
    pub entity: EntityId,
    pub interval: Interval,
    pub payload: Vec<u8>,
}

impl SeriesRecord {
    pub fn new(
        provider_id: ProviderId,
        entity: EntityId,
        interval: Interval,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            provider_id,
            entity,
            interval,
            payload,
        }
    }

    /// Timestamp the record's interval starts at.
    pub fn start(&self) -> DateTime<Utc> {
        self.interval.start()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_provider_id() {
        let id = ProviderId::new("tushare");
        assert_eq!(id.as_str(), "tushare");
        assert_eq!(id.to_string(), "tushare");

        let id2: ProviderId = "flatfile".into();
        assert_eq!(id2.as_str(), "flatfile");
    }

    #[test]
    fn test_entity_id() {
        let id = EntityId::new("600519.SH");
        assert_eq!(id.as_str(), "600519.SH");

        let id2: EntityId = String::from("AAPL").into();
        assert_eq!(id2.as_str(), "AAPL");
    }

    #[test]
    fn test_entity_ids_order_lexicographically() {
        let mut ids = vec![EntityId::new("b"), EntityId::new("a"), EntityId::new("c")];
        ids.sort();
        assert_eq!(ids, vec!["a".into(), "b".into(), "c".into()]);
    }

    #[test]
    fn test_series_record() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let interval = Interval::new(start, end).unwrap();
        let record = SeriesRecord::new(
            ProviderId::new("tushare"),
            EntityId::new("600519.SH"),
            interval,
            b"{\"close\": 1700.0}".to_vec(),
        );
        assert_eq!(record.start(), start);
        assert_eq!(record.provider_id.as_str(), "tushare");
    }
}
