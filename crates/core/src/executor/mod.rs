//! Rate-limited, bounded-concurrency execution of a batch plan.
//!
//! Tasks of one plan are independent by construction (disjoint entity/time
//! partitions), so workers run them in any order, in parallel up to the
//! configured worker bound. Two throttles stack: a [`Semaphore`] caps how
//! many tasks run at once, and the per-provider token bucket caps how fast
//! attempts are dispatched no matter how many workers are free. Every
//! attempt, retries included, consumes one token.
//!
//! A transiently failing attempt backs off exponentially and retries up to
//! the policy's attempt cap; a permanent failure ends the task at once. A
//! failed task commits nothing, so its interval stays a gap and the next
//! run picks it up again. Cancellation is cooperative: in-flight attempts
//! finish and commit, but nothing new starts afterwards.

pub mod rate_limiter;
mod retry;

pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::RetryPolicy;

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::SyncConfig;
use crate::coverage::CommitReceipt;
use crate::errors::{ProviderError, ProviderResult};
use crate::planner::{BatchPlan, FetchTask, MergeDirection};
use crate::provider::ProviderAdapter;
use crate::sink::RecordSink;
use crate::types::SeriesRecord;

/// Shared cancellation flag for one synchronization run.
///
/// Once set it never clears. Observers only ever skip work; they never
/// abort an attempt already in flight, so no partial interval is committed.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Terminal state of one executed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Fetch succeeded and the commit went through.
    Committed(CommitReceipt),
    /// Fetch or commit failed after `attempts` tries; nothing committed.
    Failed { error: String, attempts: u32 },
    /// Cancellation was observed before the task started.
    Cancelled,
}

/// One task plus how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task: FetchTask,
    pub status: TaskStatus,
}

/// Executes [`BatchPlan`]s against provider adapters.
pub struct PlanExecutor {
    limiter: Arc<RateLimiter>,
    sink: Arc<RecordSink>,
    config: SyncConfig,
}

impl PlanExecutor {
    pub fn new(limiter: Arc<RateLimiter>, sink: Arc<RecordSink>, config: SyncConfig) -> Self {
        Self {
            limiter,
            sink,
            config,
        }
    }

    /// Runs every task of `plan`, returning one result per task in plan
    /// order. Never fails as a whole; per-task outcomes carry the errors.
    pub async fn execute(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        plan: BatchPlan,
        cancel: &CancelToken,
    ) -> Vec<TaskResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut handles = Vec::with_capacity(plan.tasks.len());

        for task in plan.tasks {
            let semaphore = semaphore.clone();
            let limiter = self.limiter.clone();
            let sink = self.sink.clone();
            let adapter = adapter.clone();
            let cancel = cancel.clone();
            let config = self.config;

            handles.push(tokio::spawn(async move {
                // Closed only if the semaphore is dropped, which we hold.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("executor semaphore closed");

                if cancel.is_cancelled() {
                    debug!("Skipping task over {}: run cancelled", task.range);
                    return TaskResult {
                        task,
                        status: TaskStatus::Cancelled,
                    };
                }

                let status = run_task(&task, adapter, limiter, sink, config, cancel).await;
                TaskResult { task, status }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                // A panicking worker is a bug, but one lost task should not
                // take the rest of the run down with it.
                Err(e) => warn!("Executor worker panicked: {}", e),
            }
        }
        results
    }
}

/// Runs one task to a terminal status: attempt, classify, back off, retry.
async fn run_task(
    task: &FetchTask,
    adapter: Arc<dyn ProviderAdapter>,
    limiter: Arc<RateLimiter>,
    sink: Arc<RecordSink>,
    config: SyncConfig,
    cancel: CancelToken,
) -> TaskStatus {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        limiter.acquire(&task.provider_id).await;

        match fetch_once(task, adapter.as_ref(), &config).await {
            Ok(records) => {
                debug!(
                    "Task over {} fetched {} record(s) on attempt {}",
                    task.range,
                    records.len(),
                    attempt
                );
                return match sink.commit_task(task, records).await {
                    Ok(receipt) => TaskStatus::Committed(receipt),
                    Err(e) => TaskStatus::Failed {
                        error: e.to_string(),
                        attempts: attempt,
                    },
                };
            }
            Err(e) => {
                let retryable = e.retry_class().is_transient()
                    && config.retry.should_retry(attempt)
                    && !cancel.is_cancelled();
                if !retryable {
                    warn!(
                        "Task over {} failed permanently after {} attempt(s): {}",
                        task.range, attempt, e
                    );
                    return TaskStatus::Failed {
                        error: e.to_string(),
                        attempts: attempt,
                    };
                }

                let backoff = config.retry.backoff_for(attempt);
                debug!(
                    "Task over {} failed transiently (attempt {}), retrying in {:?}: {}",
                    task.range, attempt, backoff, e
                );
                tokio::time::sleep(backoff).await;

                // A retry is a fresh dispatch; cancellation stops it.
                if cancel.is_cancelled() {
                    return TaskStatus::Failed {
                        error: format!("cancelled after transient failure: {}", e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

/// One provider call on the task's declared direction, bounded by the
/// configured timeout. Elapsing maps to the transient timeout error.
async fn fetch_once(
    task: &FetchTask,
    adapter: &dyn ProviderAdapter,
    config: &SyncConfig,
) -> ProviderResult<Vec<SeriesRecord>> {
    let call = async {
        match task.direction {
            MergeDirection::ByTime => adapter.fetch_by_time(task.range).await,
            MergeDirection::ByEntities => adapter.fetch_by_entities(&task.entities, task.range).await,
        }
    };

    match tokio::time::timeout(config.task_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: task.provider_id.to_string(),
            elapsed_ms: config.task_timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{MemorySyncStore, SyncStore};
    use crate::errors::ProviderResult;
    use crate::intervals::Interval;
    use crate::provider::{FetchCapability, ProviderLimits};
    use crate::types::{EntityId, ProviderId};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::{Duration as StdDuration, Instant};

    fn iv(a: u32, b: u32) -> Interval {
        Interval::new(
            Utc.with_ymd_and_hms(2025, 3, a, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, b, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn fetch_task(provider: &str, entities: &[&str], a: u32, b: u32) -> FetchTask {
        FetchTask {
            provider_id: ProviderId::new(provider),
            direction: MergeDirection::ByEntities,
            entities: entities.iter().map(|e| EntityId::new(*e)).collect(),
            range: iv(a, b),
        }
    }

    fn plan_of(provider: &str, tasks: Vec<FetchTask>) -> BatchPlan {
        BatchPlan {
            provider_id: ProviderId::new(provider),
            direction: Some(MergeDirection::ByEntities),
            tasks,
            cost: Default::default(),
        }
    }

    fn fast_config() -> SyncConfig {
        SyncConfig {
            workers: 4,
            task_timeout: StdDuration::from_millis(200),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: StdDuration::from_millis(5),
                max_backoff: StdDuration::from_millis(20),
            },
            earliest_start: None,
        }
    }

    /// Scripted adapter: fails the first `failures_before_success` calls
    /// with the given error, records dispatch timestamps, optionally stalls.
    struct ScriptedAdapter {
        id: ProviderId,
        failures_before_success: AtomicU32,
        error: Option<ProviderError>,
        stall: Option<StdDuration>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedAdapter {
        fn succeeding(provider: &str) -> Arc<Self> {
            Self::new(provider, 0, None, None)
        }

        fn new(
            provider: &str,
            failures: u32,
            error: Option<ProviderError>,
            stall: Option<StdDuration>,
        ) -> Arc<Self> {
            Arc::new(Self {
                id: ProviderId::new(provider),
                failures_before_success: AtomicU32::new(failures),
                error,
                stall,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn id(&self) -> &ProviderId {
            &self.id
        }

        fn capability(&self) -> FetchCapability {
            FetchCapability::EntityOnly
        }

        fn limits(&self) -> ProviderLimits {
            ProviderLimits::new(100, 10_000, chrono::Duration::days(1))
        }

        async fn fetch_by_entities(
            &self,
            entities: &[EntityId],
            range: Interval,
        ) -> ProviderResult<Vec<SeriesRecord>> {
            self.calls.lock().unwrap().push(Instant::now());
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            if self.failures_before_success.load(Ordering::SeqCst) > 0 {
                self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
                return Err(self.error.clone().unwrap_or(ProviderError::Unavailable {
                    provider: self.id.to_string(),
                    message: "scripted failure".to_string(),
                }));
            }
            Ok(entities
                .iter()
                .map(|entity| {
                    SeriesRecord::new(self.id.clone(), entity.clone(), range, b"ok".to_vec())
                })
                .collect())
        }
    }

    fn executor_with(store: Arc<MemorySyncStore>, config: SyncConfig) -> PlanExecutor {
        PlanExecutor::new(
            Arc::new(RateLimiter::new()),
            Arc::new(RecordSink::new(store)),
            config,
        )
    }

    #[tokio::test]
    async fn test_successful_plan_commits_every_task() {
        let store = Arc::new(MemorySyncStore::new());
        let executor = executor_with(store.clone(), fast_config());
        let adapter = ScriptedAdapter::succeeding("exec");
        let plan = plan_of(
            "exec",
            vec![
                fetch_task("exec", &["A"], 1, 3),
                fetch_task("exec", &["B"], 3, 5),
            ],
        );

        let results = executor
            .execute(adapter, plan, &CancelToken::new())
            .await;

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(matches!(result.status, TaskStatus::Committed(_)));
        }
        assert!(store
            .coverage(&ProviderId::new("exec"), &EntityId::new("A"))
            .unwrap()
            .covers(&iv(1, 3)));
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let store = Arc::new(MemorySyncStore::new());
        let executor = executor_with(store.clone(), fast_config());
        let adapter = ScriptedAdapter::new("exec", 2, None, None);
        let plan = plan_of("exec", vec![fetch_task("exec", &["A"], 1, 3)]);

        let results = executor
            .execute(adapter.clone(), plan, &CancelToken::new())
            .await;

        assert!(matches!(results[0].status, TaskStatus::Committed(_)));
        assert_eq!(adapter.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_coverage_untouched() {
        let store = Arc::new(MemorySyncStore::new());
        let executor = executor_with(store.clone(), fast_config());
        // More failures than the 3-attempt budget.
        let adapter = ScriptedAdapter::new("exec", 10, None, None);
        let plan = plan_of("exec", vec![fetch_task("exec", &["A"], 1, 3)]);

        let results = executor
            .execute(adapter.clone(), plan, &CancelToken::new())
            .await;

        match &results[0].status {
            TaskStatus::Failed { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(adapter.call_count(), 3);
        assert!(store
            .coverage(&ProviderId::new("exec"), &EntityId::new("A"))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let store = Arc::new(MemorySyncStore::new());
        let executor = executor_with(store, fast_config());
        let adapter = ScriptedAdapter::new(
            "exec",
            10,
            Some(ProviderError::InvalidRequest {
                provider: "exec".to_string(),
                message: "bad key".to_string(),
            }),
            None,
        );
        let plan = plan_of("exec", vec![fetch_task("exec", &["A"], 1, 3)]);

        let results = executor
            .execute(adapter.clone(), plan, &CancelToken::new())
            .await;

        match &results[0].status {
            TaskStatus::Failed { attempts, error } => {
                assert_eq!(*attempts, 1);
                assert!(error.contains("bad key"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let store = Arc::new(MemorySyncStore::new());
        let mut config = fast_config();
        config.task_timeout = StdDuration::from_millis(20);
        config.retry.max_attempts = 2;
        let executor = executor_with(store, config);
        // Stalls past the timeout on every call.
        let adapter =
            ScriptedAdapter::new("exec", 0, None, Some(StdDuration::from_millis(100)));
        let plan = plan_of("exec", vec![fetch_task("exec", &["A"], 1, 3)]);

        let results = executor
            .execute(adapter.clone(), plan, &CancelToken::new())
            .await;

        match &results[0].status {
            TaskStatus::Failed { attempts, error } => {
                assert_eq!(*attempts, 2);
                assert!(error.contains("Timeout"));
            }
            other => panic!("expected timeout failure, got {:?}", other),
        }
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_skips_pending_tasks() {
        let store = Arc::new(MemorySyncStore::new());
        let mut config = fast_config();
        config.workers = 1;
        let executor = executor_with(store, config);
        let adapter = ScriptedAdapter::succeeding("exec");
        let cancel = CancelToken::new();
        cancel.cancel();

        let plan = plan_of(
            "exec",
            vec![
                fetch_task("exec", &["A"], 1, 3),
                fetch_task("exec", &["B"], 3, 5),
            ],
        );
        let results = executor.execute(adapter.clone(), plan, &cancel).await;

        assert_eq!(adapter.call_count(), 0);
        for result in &results {
            assert_eq!(result.status, TaskStatus::Cancelled);
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let store = Arc::new(MemorySyncStore::new());
        let executor = executor_with(store, fast_config());
        let adapter = ScriptedAdapter::new("exec", 10, None, None);
        let cancel = CancelToken::new();

        let plan = plan_of("exec", vec![fetch_task("exec", &["A"], 1, 3)]);
        // Cancel between the first attempt and its retry.
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(2)).await;
            cancel_clone.cancel();
        });

        let results = executor.execute(adapter.clone(), plan, &cancel).await;
        assert!(matches!(results[0].status, TaskStatus::Failed { .. }));
        assert!(adapter.call_count() < 3);
    }

    #[tokio::test]
    async fn test_dispatch_rate_stays_within_qps_plus_burst() {
        let store = Arc::new(MemorySyncStore::new());
        let limiter = Arc::new(RateLimiter::new());
        let provider = ProviderId::new("throttled");
        limiter.configure(&provider, RateLimitConfig { qps: 5 });
        let executor = PlanExecutor::new(
            limiter,
            Arc::new(RecordSink::new(store)),
            SyncConfig {
                workers: 8,
                ..fast_config()
            },
        );

        let adapter = ScriptedAdapter::succeeding("throttled");
        let tasks: Vec<FetchTask> = (0..12)
            .map(|i| fetch_task("throttled", &["A"], i + 1, i + 2))
            .collect();
        let plan = plan_of("throttled", tasks);

        let results = executor
            .execute(adapter.clone(), plan, &CancelToken::new())
            .await;
        assert_eq!(results.len(), 12);

        // Sliding one-second window: at most qps (burst) + qps (refill).
        let times = adapter.call_times();
        for (i, window_start) in times.iter().enumerate() {
            let in_window = times[i..]
                .iter()
                .take_while(|t| t.duration_since(*window_start) < StdDuration::from_secs(1))
                .count();
            assert!(in_window <= 10, "{} dispatches in one second", in_window);
        }
    }
}
