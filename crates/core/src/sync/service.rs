//! The synchronization orchestrator.
//!
//! ```text
//! SyncService::sync(request)
//!       │
//!       ├─► ProviderRegistry   resolve adapter, limits, limiter bucket
//!       ├─► EntityRegistry     expand the ALL selector
//!       ├─► SyncStore          batch coverage read
//!       ├─► GapSet             subtract coverage from the window
//!       ├─► MergePlanner       gaps → BatchPlan
//!       └─► PlanExecutor       run plan, commit through RecordSink
//! ```
//!
//! Gap computation and planning are synchronous; only fetching and the
//! store commits suspend. `sync` returns `Err` only for setup problems
//! (unknown provider, invalid window, store read failure) — per-task
//! failures are absorbed into the [`SyncReport`].

use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::coverage::{GapSet, SyncStore};
use crate::errors::{Result, ValidationError};
use crate::executor::{CancelToken, PlanExecutor};
use crate::intervals::Interval;
use crate::planner::MergePlanner;
use crate::provider::{EntityRegistry, ProviderRegistry};
use crate::sink::RecordSink;
use crate::sync::types::{EntitySelector, SyncReport, SyncRequest};
use crate::types::EntityId;

/// Ties registries, store, planner and executor into one entry point.
pub struct SyncService {
    registry: Arc<ProviderRegistry>,
    entities: Arc<dyn EntityRegistry>,
    store: Arc<dyn SyncStore>,
    executor: PlanExecutor,
    config: SyncConfig,
}

impl SyncService {
    /// Builds the service; fails on an invalid configuration.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        entities: Arc<dyn EntityRegistry>,
        store: Arc<dyn SyncStore>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let executor = PlanExecutor::new(
            registry.limiter(),
            Arc::new(RecordSink::new(store.clone())),
            config,
        );
        Ok(Self {
            registry,
            entities,
            store,
            executor,
            config,
        })
    }

    /// Runs one synchronization request to completion.
    pub async fn sync(&self, request: &SyncRequest, cancel: &CancelToken) -> Result<SyncReport> {
        let run_id = Uuid::new_v4().to_string();
        let mut report = SyncReport::new(run_id.clone(), request.provider_id.clone());

        let adapter = self.registry.resolve(&request.provider_id)?;
        let limits = adapter.limits();

        // Validate the raw window before clamping so an inverted request is
        // an error, not a silent no-op.
        Interval::new(request.start, request.end)?;

        // Clamp away what the provider cannot have published yet, and
        // anything below the configured history floor.
        let ceiling = Utc::now() - limits.lag;
        let mut start = request.start;
        if let Some(floor) = self.config.earliest_start {
            start = start.max(floor);
        }
        let end = request.end.min(ceiling);
        if start >= end {
            info!(
                "[{}] Window [{}, {}) clamps to nothing for '{}', nothing to do",
                run_id, request.start, request.end, request.provider_id
            );
            return Ok(report);
        }
        let window = Interval::new(start, end)?;

        let entities = self.expand_selector(request).await?;
        report.entity_count = entities.len();
        if entities.is_empty() {
            info!(
                "[{}] Provider '{}' has an empty entity universe, nothing to do",
                run_id, request.provider_id
            );
            return Ok(report);
        }

        let coverage = self.store.coverage_many(&request.provider_id, &entities)?;
        let gaps = GapSet::compute(&coverage, &entities, &window);
        if gaps.is_empty() {
            info!(
                "[{}] {} entit(ies) fully covered over {}, nothing to fetch",
                run_id,
                entities.len(),
                window
            );
            return Ok(report);
        }

        let planner = MergePlanner::new(
            request.provider_id.clone(),
            adapter.capability(),
            limits,
        );
        let plan = planner.plan(&gaps, &entities);
        report.direction = plan.direction;
        report.planned_tasks = plan.len();
        info!(
            "[{}] {} gap(s) across {} entit(ies) → {} task(s) ({:?} direction)",
            run_id,
            gaps.gap_count(),
            gaps.entity_count(),
            plan.len(),
            plan.direction
        );

        for result in self.executor.execute(adapter, plan, cancel).await {
            report.absorb(result);
        }

        if report.is_success() {
            info!("[{}] {}", run_id, report.summary());
        } else {
            warn!("[{}] {}", run_id, report.summary());
        }
        Ok(report)
    }

    /// Expands the request's selector into a concrete entity list.
    async fn expand_selector(&self, request: &SyncRequest) -> Result<Vec<EntityId>> {
        match &request.selector {
            EntitySelector::Explicit(entities) => {
                if entities.is_empty() {
                    return Err(ValidationError::NoEntities(
                        "explicit selector is empty".to_string(),
                    )
                    .into());
                }
                Ok(entities.clone())
            }
            EntitySelector::All => self.entities.entities(&request.provider_id).await,
        }
    }
}
