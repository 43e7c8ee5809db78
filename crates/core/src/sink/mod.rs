//! Record sink: the one path from a successful fetch into the store.

use log::{debug, error};
use std::sync::Arc;

use crate::coverage::{CommitReceipt, SyncStore};
use crate::errors::Result;
use crate::planner::FetchTask;
use crate::types::SeriesRecord;

/// Routes a task's records plus its coverage claims into a single atomic
/// store commit.
///
/// Claims are derived from the task, never from record contents: a fetch
/// that returns nothing for its range still covers it, so a confirmed-empty
/// period is not re-fetched on the next run. A failed commit fails only the
/// task; re-running is safe because records are keyed and upsertable.
pub struct RecordSink {
    store: Arc<dyn SyncStore>,
}

impl RecordSink {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self { store }
    }

    /// Commits `records` and the task's claims in one atomic unit.
    pub async fn commit_task(
        &self,
        task: &FetchTask,
        records: Vec<SeriesRecord>,
    ) -> Result<CommitReceipt> {
        let claims = task.claims();
        debug!(
            "Committing {} record(s) and {} claim(s) for provider '{}' over {}",
            records.len(),
            claims.len(),
            task.provider_id,
            task.range
        );

        match self.store.commit(&task.provider_id, &claims, records).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                error!(
                    "Commit failed for provider '{}' over {}: {}",
                    task.provider_id, task.range, e
                );
                Err(e)
            }
        }
    }
}
