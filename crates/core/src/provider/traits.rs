//! Provider adapter trait definitions.
//!
//! This module defines the core `ProviderAdapter` trait that all data
//! providers must implement, plus the capability tag and limit set the
//! planner and executor consult.

use async_trait::async_trait;
use chrono::Duration;
use serde::Serialize;
use std::fmt;

use crate::errors::{ProviderError, ProviderResult, ValidationError};
use crate::intervals::Interval;
use crate::types::{EntityId, ProviderId, SeriesRecord};

/// Which fetch surfaces an adapter implements.
///
/// The planner branches on this tag instead of probing methods, and the
/// invariant that every adapter has at least one fetch method holds by
/// construction: there is no empty variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum FetchCapability {
    /// Only ranged queries over all entities (`fetch_by_time`).
    TimeOnly,

    /// Only per-entity-batch queries (`fetch_by_entities`).
    EntityOnly,

    /// Both surfaces; the planner picks the cheaper one per request.
    Both,
}

impl FetchCapability {
    pub fn supports_by_time(self) -> bool {
        matches!(self, Self::TimeOnly | Self::Both)
    }

    pub fn supports_by_entities(self) -> bool {
        matches!(self, Self::EntityOnly | Self::Both)
    }
}

impl fmt::Display for FetchCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeOnly => write!(f, "by-time"),
            Self::EntityOnly => write!(f, "by-entities"),
            Self::Both => write!(f, "by-time+by-entities"),
        }
    }
}

/// Throughput and shape limits for one provider.
///
/// Controls how aggressively we can call a provider and how large a single
/// query may be before its response gets truncated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProviderLimits {
    /// Maximum queries per second. Also the token-bucket burst capacity.
    pub qps: u32,

    /// Most records one query may return.
    pub max_records_per_query: u32,

    /// Smallest meaningful time step of the data (one bar, one reading).
    pub native_frequency: Duration,

    /// How far published data trails real time. Requests past `now - lag`
    /// are clamped away instead of fetched and re-fetched.
    pub lag: Duration,
}

impl ProviderLimits {
    pub fn new(qps: u32, max_records_per_query: u32, native_frequency: Duration) -> Self {
        Self {
            qps,
            max_records_per_query,
            native_frequency,
            lag: Duration::zero(),
        }
    }

    pub fn with_lag(mut self, lag: Duration) -> Self {
        self.lag = lag;
        self
    }

    /// Registration-time sanity check.
    pub fn validate(&self, provider: &ProviderId) -> Result<(), ValidationError> {
        if self.qps == 0 {
            return Err(ValidationError::InvalidLimits {
                provider: provider.to_string(),
                message: "qps must be positive".to_string(),
            });
        }
        if self.max_records_per_query == 0 {
            return Err(ValidationError::InvalidLimits {
                provider: provider.to_string(),
                message: "max_records_per_query must be positive".to_string(),
            });
        }
        if self.native_frequency <= Duration::zero() {
            return Err(ValidationError::InvalidLimits {
                provider: provider.to_string(),
                message: "native_frequency must be positive".to_string(),
            });
        }
        if self.lag < Duration::zero() {
            return Err(ValidationError::InvalidLimits {
                provider: provider.to_string(),
                message: "lag cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Trait for data provider adapters.
///
/// Implement this trait to add support for a new upstream source. Override
/// the fetch methods matching the declared [`FetchCapability`]; the default
/// implementations return [`ProviderError::NotSupported`], so a
/// misdeclared capability surfaces as a permanent task failure rather than
/// a silent wrong answer.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier, used for registration, storage keys, logging and
    /// rate-limiter buckets.
    fn id(&self) -> &ProviderId;

    /// Declared fetch surfaces.
    fn capability(&self) -> FetchCapability;

    /// Throughput limits the executor and planner must respect.
    fn limits(&self) -> ProviderLimits;

    /// Fetches records for an explicit entity batch over `range`.
    ///
    /// Returned records may cover any sub-intervals of `range`; an empty
    /// result is a valid answer meaning "no data there".
    async fn fetch_by_entities(
        &self,
        entities: &[EntityId],
        range: Interval,
    ) -> ProviderResult<Vec<SeriesRecord>> {
        let _ = (entities, range);
        Err(ProviderError::NotSupported {
            provider: self.id().to_string(),
            operation: "fetch_by_entities".to_string(),
        })
    }

    /// Fetches records for every entity the provider knows over `range`.
    async fn fetch_by_time(&self, range: Interval) -> ProviderResult<Vec<SeriesRecord>> {
        let _ = range;
        Err(ProviderError::NotSupported {
            provider: self.id().to_string(),
            operation: "fetch_by_time".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    struct DeclaredTimeOnly;

    #[async_trait]
    impl ProviderAdapter for DeclaredTimeOnly {
        fn id(&self) -> &ProviderId {
            static ID: std::sync::OnceLock<ProviderId> = std::sync::OnceLock::new();
            ID.get_or_init(|| ProviderId::new("time-only"))
        }

        fn capability(&self) -> FetchCapability {
            FetchCapability::TimeOnly
        }

        fn limits(&self) -> ProviderLimits {
            ProviderLimits::new(5, 1000, Duration::days(1))
        }

        async fn fetch_by_time(&self, _range: Interval) -> ProviderResult<Vec<SeriesRecord>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_capability_flags() {
        assert!(FetchCapability::TimeOnly.supports_by_time());
        assert!(!FetchCapability::TimeOnly.supports_by_entities());
        assert!(!FetchCapability::EntityOnly.supports_by_time());
        assert!(FetchCapability::EntityOnly.supports_by_entities());
        assert!(FetchCapability::Both.supports_by_time());
        assert!(FetchCapability::Both.supports_by_entities());
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(FetchCapability::Both.to_string(), "by-time+by-entities");
    }

    #[test]
    fn test_limits_validation() {
        let provider = ProviderId::new("p");
        assert!(ProviderLimits::new(5, 100, Duration::days(1))
            .validate(&provider)
            .is_ok());
        assert!(ProviderLimits::new(0, 100, Duration::days(1))
            .validate(&provider)
            .is_err());
        assert!(ProviderLimits::new(5, 0, Duration::days(1))
            .validate(&provider)
            .is_err());
        assert!(ProviderLimits::new(5, 100, Duration::zero())
            .validate(&provider)
            .is_err());
        assert!(ProviderLimits::new(5, 100, Duration::days(1))
            .with_lag(Duration::seconds(-1))
            .validate(&provider)
            .is_err());
    }

    #[tokio::test]
    async fn test_unimplemented_surface_returns_not_supported() {
        let adapter = DeclaredTimeOnly;
        let range = Interval::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
        )
        .unwrap();

        let err = adapter
            .fetch_by_entities(&[EntityId::new("A")], range)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotSupported { .. }));
        assert_eq!(err.retry_class(), crate::errors::RetryClass::Permanent);
    }
}
