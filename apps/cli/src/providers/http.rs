//! Generic HTTP JSON provider.
//!
//! Speaks a small REST shape: `GET /records` returns an array of objects
//! with `entity`, `start` and `end` fields (any other fields ride along in
//! the stored payload), and `GET /entities` returns an array of entity
//! names. Capability and limits come from configuration, so one adapter
//! covers any vendor exposing this shape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use histsync_core::errors::{ProviderError, ProviderResult};
use histsync_core::intervals::Interval;
use histsync_core::provider::{FetchCapability, ProviderAdapter, ProviderLimits};
use histsync_core::types::{EntityId, ProviderId, SeriesRecord};

const API_KEY_HEADER: &str = "x-api-key";

pub struct HttpProvider {
    id: ProviderId,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    capability: FetchCapability,
    limits: ProviderLimits,
}

/// The fields every `/records` element must carry; the rest of the object
/// is preserved verbatim as the payload.
#[derive(Deserialize)]
struct WireRecord {
    entity: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl HttpProvider {
    pub fn new(
        id: ProviderId,
        base_url: String,
        api_key: Option<String>,
        capability: FetchCapability,
        limits: ProviderLimits,
    ) -> Self {
        Self {
            id,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            capability,
            limits,
        }
    }

    /// The provider's entity universe, from its `/entities` endpoint.
    pub async fn universe(&self) -> ProviderResult<Vec<EntityId>> {
        let body = self.get(&format!("{}/entities", self.base_url), &[]).await?;
        let names: Vec<String> = serde_json::from_str(&body).map_err(|e| self.malformed(e))?;
        Ok(names.into_iter().map(EntityId::new).collect())
    }

    async fn fetch(
        &self,
        entities: Option<&[EntityId]>,
        range: Interval,
    ) -> ProviderResult<Vec<SeriesRecord>> {
        let start = range.start().to_rfc3339();
        let end = range.end().to_rfc3339();
        let mut query: Vec<(&str, String)> = vec![("start", start), ("end", end)];
        if let Some(entities) = entities {
            let names: Vec<&str> = entities.iter().map(EntityId::as_str).collect();
            query.push(("entities", names.join(",")));
        }

        let body = self
            .get(&format!("{}/records", self.base_url), &query)
            .await?;
        let raw: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| self.malformed(e))?;

        let mut records = Vec::with_capacity(raw.len());
        for value in raw {
            let wire: WireRecord =
                serde_json::from_value(value.clone()).map_err(|e| self.malformed(e))?;
            let interval = Interval::new(wire.start, wire.end)
                .map_err(|e| self.malformed(e))?;
            let payload = serde_json::to_vec(&value).map_err(|e| self.malformed(e))?;
            records.push(SeriesRecord::new(
                self.id.clone(),
                EntityId::new(wire.entity),
                interval,
                payload,
            ));
        }
        Ok(records)
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> ProviderResult<String> {
        let mut request = self.client.get(url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: self.id.to_string(),
                    elapsed_ms: 0,
                }
            } else {
                ProviderError::Network {
                    provider: self.id.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Network {
            provider: self.id.to_string(),
            message: e.to_string(),
        })?;

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited {
                provider: self.id.to_string(),
                message: body,
            }),
            s if s.is_server_error() => Err(ProviderError::Unavailable {
                provider: self.id.to_string(),
                message: format!("{s}: {body}"),
            }),
            s => Err(ProviderError::InvalidRequest {
                provider: self.id.to_string(),
                message: format!("{s}: {body}"),
            }),
        }
    }

    fn malformed(&self, error: impl std::fmt::Display) -> ProviderError {
        ProviderError::Malformed {
            provider: self.id.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for HttpProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn capability(&self) -> FetchCapability {
        self.capability
    }

    fn limits(&self) -> ProviderLimits {
        self.limits
    }

    async fn fetch_by_entities(
        &self,
        entities: &[EntityId],
        range: Interval,
    ) -> ProviderResult<Vec<SeriesRecord>> {
        if !self.capability.supports_by_entities() {
            return Err(ProviderError::NotSupported {
                provider: self.id.to_string(),
                operation: "fetch_by_entities".to_string(),
            });
        }
        self.fetch(Some(entities), range).await
    }

    async fn fetch_by_time(&self, range: Interval) -> ProviderResult<Vec<SeriesRecord>> {
        if !self.capability.supports_by_time() {
            return Err(ProviderError::NotSupported {
                provider: self.id.to_string(),
                operation: "fetch_by_time".to_string(),
            });
        }
        self.fetch(None, range).await
    }
}
