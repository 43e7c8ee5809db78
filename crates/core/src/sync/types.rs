//! Request and report types for a synchronization run.

use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};

use crate::coverage::CommitReceipt;
use crate::executor::{TaskResult, TaskStatus};
use crate::intervals::Interval;
use crate::planner::MergeDirection;
use crate::types::{EntityId, ProviderId};

/// Which entities a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitySelector {
    /// Every entity the provider's universe registry knows.
    All,
    /// An explicit, non-empty entity list.
    Explicit(Vec<EntityId>),
}

/// One caller-issued synchronization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub provider_id: ProviderId,
    pub selector: EntitySelector,
    /// Requested window start, inclusive.
    pub start: DateTime<Utc>,
    /// Requested window end, exclusive. Clamped to `now - provider.lag`.
    pub end: DateTime<Utc>,
}

impl SyncRequest {
    pub fn new(
        provider_id: ProviderId,
        selector: EntitySelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            provider_id,
            selector,
            start,
            end,
        }
    }
}

/// One task that did not commit, kept for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub entities: Vec<EntityId>,
    pub range: Interval,
    pub error: String,
    pub attempts: u32,
}

/// Per-run outcome summary.
///
/// A run never fails as a whole; setup errors surface as `Err` from the
/// service, everything after planning lands here per task. A non-empty
/// failure list is the caller's cue to re-issue the request later — failed
/// intervals are still gaps and heal on the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Correlates the run's log lines.
    pub run_id: String,
    pub provider_id: ProviderId,
    /// Merge direction the planner chose; `None` when nothing was planned.
    pub direction: Option<MergeDirection>,
    /// Entities the request expanded to.
    pub entity_count: usize,
    pub planned_tasks: usize,
    pub committed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub records_written: usize,
    pub intervals_committed: usize,
    pub failures: Vec<TaskFailure>,
}

impl SyncReport {
    pub(crate) fn new(run_id: String, provider_id: ProviderId) -> Self {
        Self {
            run_id,
            provider_id,
            direction: None,
            entity_count: 0,
            planned_tasks: 0,
            committed: 0,
            failed: 0,
            cancelled: 0,
            records_written: 0,
            intervals_committed: 0,
            failures: Vec::new(),
        }
    }

    /// True when every planned task committed.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// True when the run had nothing to do at all.
    pub fn is_noop(&self) -> bool {
        self.planned_tasks == 0
    }

    /// One-line human summary for logs.
    pub fn summary(&self) -> String {
        if self.is_noop() {
            format!("Nothing to fetch from '{}': coverage is complete", self.provider_id)
        } else if self.is_success() {
            format!(
                "Fetched {} record(s) over {} task(s) from '{}'",
                self.records_written, self.committed, self.provider_id
            )
        } else {
            format!(
                "Fetched {} record(s) from '{}' with {} failed and {} cancelled task(s) of {}",
                self.records_written,
                self.provider_id,
                self.failed,
                self.cancelled,
                self.planned_tasks
            )
        }
    }

    /// Folds one executed task into the counters.
    pub(crate) fn absorb(&mut self, result: TaskResult) {
        match result.status {
            TaskStatus::Committed(CommitReceipt {
                records_written,
                intervals_committed,
            }) => {
                self.committed += 1;
                self.records_written += records_written;
                self.intervals_committed += intervals_committed;
            }
            TaskStatus::Failed { error, attempts } => {
                self.failed += 1;
                self.failures.push(TaskFailure {
                    entities: result.task.entities,
                    range: result.task.range,
                    error,
                    attempts,
                });
            }
            TaskStatus::Cancelled => {
                self.cancelled += 1;
            }
        }
    }
}
