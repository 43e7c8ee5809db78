//! Builds the provider and entity registries from configuration.
//!
//! Providers are described in a JSON array, one object per adapter:
//!
//! ```json
//! [
//!   {"kind": "flatfile", "id": "dump", "root": "./dump"},
//!   {"kind": "http", "id": "vendor", "base_url": "https://api.example.com",
//!    "api_key": "…", "capability": "both", "qps": 5,
//!    "max_records_per_query": 5000, "native_frequency_secs": 86400,
//!    "lag_secs": 3600, "entities": ["AAPL", "MSFT"]}
//! ]
//! ```
//!
//! An explicit `entities` list pins the ALL-universe; without it the
//! flat-file adapter scans its root directory and the HTTP adapter asks
//! its `/entities` endpoint.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use histsync_core::errors::Result;
use histsync_core::provider::{
    EntityRegistry, FetchCapability, ProviderLimits, ProviderRegistry,
};
use histsync_core::types::{EntityId, ProviderId};

use crate::providers::{FlatFileProvider, HttpProvider};

#[derive(Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "kebab-case")]
enum CapabilitySpec {
    TimeOnly,
    EntityOnly,
    Both,
}

impl From<CapabilitySpec> for FetchCapability {
    fn from(spec: CapabilitySpec) -> Self {
        match spec {
            CapabilitySpec::TimeOnly => FetchCapability::TimeOnly,
            CapabilitySpec::EntityOnly => FetchCapability::EntityOnly,
            CapabilitySpec::Both => FetchCapability::Both,
        }
    }
}

#[derive(Deserialize, Debug)]
struct LimitsSpec {
    #[serde(default = "default_qps")]
    qps: u32,
    #[serde(default = "default_max_records")]
    max_records_per_query: u32,
    #[serde(default = "default_frequency_secs")]
    native_frequency_secs: i64,
    #[serde(default)]
    lag_secs: i64,
}

fn default_qps() -> u32 {
    histsync_core::constants::DEFAULT_QPS
}

fn default_max_records() -> u32 {
    10_000
}

fn default_frequency_secs() -> i64 {
    86_400
}

impl LimitsSpec {
    fn to_limits(&self) -> ProviderLimits {
        ProviderLimits::new(
            self.qps,
            self.max_records_per_query,
            Duration::seconds(self.native_frequency_secs),
        )
        .with_lag(Duration::seconds(self.lag_secs))
    }
}

/// One configured adapter.
#[derive(Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderSpec {
    Flatfile {
        id: String,
        root: PathBuf,
        #[serde(flatten)]
        limits: LimitsSpec,
        #[serde(default)]
        entities: Option<Vec<String>>,
    },
    Http {
        id: String,
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
        capability: CapabilitySpec,
        #[serde(flatten)]
        limits: LimitsSpec,
        #[serde(default)]
        entities: Option<Vec<String>>,
    },
}

/// Where a provider's ALL-universe comes from.
enum Universe {
    Static(Vec<EntityId>),
    Directory(Arc<FlatFileProvider>),
    Remote(Arc<HttpProvider>),
}

/// Entity registry backed by the configured universe sources.
#[derive(Default)]
pub struct AppEntityRegistry {
    universes: HashMap<ProviderId, Universe>,
}

#[async_trait]
impl EntityRegistry for AppEntityRegistry {
    async fn entities(&self, provider_id: &ProviderId) -> Result<Vec<EntityId>> {
        match self.universes.get(provider_id) {
            None => Ok(Vec::new()),
            Some(Universe::Static(list)) => Ok(list.clone()),
            Some(Universe::Directory(provider)) => Ok(provider.universe()?),
            Some(Universe::Remote(provider)) => Ok(provider.universe().await?),
        }
    }
}

/// Loads provider specs from a JSON file.
pub fn load_specs(path: &str) -> anyhow::Result<Vec<ProviderSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read provider file {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid provider file {path}"))
}

/// Registers every configured adapter and wires its universe source.
pub fn build(
    specs: Vec<ProviderSpec>,
) -> anyhow::Result<(Arc<ProviderRegistry>, Arc<AppEntityRegistry>)> {
    let registry = Arc::new(ProviderRegistry::new());
    let mut universes = HashMap::new();

    for spec in specs {
        match spec {
            ProviderSpec::Flatfile {
                id,
                root,
                limits,
                entities,
            } => {
                let provider_id = ProviderId::new(id);
                let provider = Arc::new(FlatFileProvider::new(
                    provider_id.clone(),
                    root,
                    limits.to_limits(),
                ));
                registry.register(provider.clone())?;
                let universe = match entities {
                    Some(names) => Universe::Static(to_entities(names)),
                    None => Universe::Directory(provider),
                };
                universes.insert(provider_id, universe);
            }
            ProviderSpec::Http {
                id,
                base_url,
                api_key,
                capability,
                limits,
                entities,
            } => {
                let provider_id = ProviderId::new(id);
                let provider = Arc::new(HttpProvider::new(
                    provider_id.clone(),
                    base_url,
                    api_key,
                    capability.into(),
                    limits.to_limits(),
                ));
                registry.register(provider.clone())?;
                let universe = match entities {
                    Some(names) => Universe::Static(to_entities(names)),
                    None => Universe::Remote(provider),
                };
                universes.insert(provider_id, universe);
            }
        }
    }

    Ok((registry, Arc::new(AppEntityRegistry { universes })))
}

fn to_entities(names: Vec<String>) -> Vec<EntityId> {
    names.into_iter().map(EntityId::new).collect()
}
