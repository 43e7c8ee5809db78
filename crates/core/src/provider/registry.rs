//! Provider and entity registries.
//!
//! [`ProviderRegistry`] owns the adapters and the shared [`RateLimiter`];
//! registering an adapter validates its declared limits and provisions its
//! token bucket, so an adapter that made it into the registry is always
//! safe to plan against. [`EntityRegistry`] answers "which entities exist
//! for this provider" when a request selects ALL.

use async_trait::async_trait;
use dashmap::DashMap;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{Result, ValidationError};
use crate::executor::{RateLimitConfig, RateLimiter};
use crate::provider::traits::ProviderAdapter;
use crate::types::{EntityId, ProviderId};

/// Registry of adapters keyed by provider id.
pub struct ProviderRegistry {
    adapters: DashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    limiter: Arc<RateLimiter>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
            limiter: Arc::new(RateLimiter::new()),
        }
    }

    /// Validates the adapter's limits, provisions its rate-limit bucket and
    /// stores it. Re-registering an id replaces the previous adapter.
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) -> Result<()> {
        let id = adapter.id().clone();
        let limits = adapter.limits();
        limits.validate(&id)?;
        self.limiter
            .configure(&id, RateLimitConfig { qps: limits.qps });
        info!(
            "Registered provider '{}' ({}, qps={}, max_records={})",
            id,
            adapter.capability(),
            limits.qps,
            limits.max_records_per_query
        );
        self.adapters.insert(id, adapter);
        Ok(())
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).map(|entry| entry.value().clone())
    }

    /// Like [`get`](Self::get) but fails with a validation error naming the
    /// unknown id.
    pub fn resolve(&self, id: &ProviderId) -> Result<Arc<dyn ProviderAdapter>> {
        self.get(id)
            .ok_or_else(|| ValidationError::UnknownProvider(id.to_string()).into())
    }

    /// Registered provider ids, sorted for stable listings.
    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.adapters.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// The limiter shared by every registered provider's bucket.
    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Universe source for requests that select every entity of a provider.
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// Every entity known for `provider_id`. May be empty, may be large.
    async fn entities(&self, provider_id: &ProviderId) -> Result<Vec<EntityId>>;
}

/// Fixed per-provider entity lists, for configuration-driven universes.
#[derive(Debug, Clone, Default)]
pub struct StaticEntityRegistry {
    universes: HashMap<ProviderId, Vec<EntityId>>,
}

impl StaticEntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_universe(mut self, provider_id: ProviderId, entities: Vec<EntityId>) -> Self {
        self.universes.insert(provider_id, entities);
        self
    }
}

#[async_trait]
impl EntityRegistry for StaticEntityRegistry {
    async fn entities(&self, provider_id: &ProviderId) -> Result<Vec<EntityId>> {
        Ok(self.universes.get(provider_id).cloned().unwrap_or_default())
    }
}
