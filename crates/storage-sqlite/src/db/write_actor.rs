//! Single-writer actor serializing all database mutations.
//!
//! SQLite allows one writer at a time; funneling every mutation through a
//! dedicated connection turns executor-level concurrency into an orderly
//! queue and gives each job an immediate transaction for free. This is
//! what makes a commit of records plus coverage claims atomic.

use super::DbPool;
use crate::errors::StorageError;
use diesel::SqliteConnection;
use histsync_core::coverage::CommitReceipt;
use histsync_core::errors::Result;
use tokio::sync::{mpsc, oneshot};

// A queued commit: runs on the writer's connection, inside an immediate
// transaction. Commits are the only mutation the store performs, so the
// channel is typed to their receipt directly.
type CommitJob =
    Box<dyn FnOnce(&mut SqliteConnection) -> Result<CommitReceipt> + Send + 'static>;

type Reply = oneshot::Sender<Result<CommitReceipt>>;

/// Handle for sending commit jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<(CommitJob, Reply)>,
}

impl WriteHandle {
    /// Executes `job` on the writer's dedicated connection and returns its
    /// receipt.
    pub async fn exec<F>(&self, job: F) -> Result<CommitReceipt>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<CommitReceipt> + Send + 'static,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((Box::new(job), ret_tx))
            .await
            .expect("writer actor stopped: its receiving channel is closed");

        ret_rx
            .await
            .expect("writer actor dropped the reply sender without answering")
    }
}

/// Spawns the background writer task.
///
/// The actor checks one connection out of `pool` for its whole lifetime and
/// processes jobs in arrival order, each inside an immediate transaction so
/// the write lock is taken up front. It terminates once every
/// [`WriteHandle`] clone is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(CommitJob, Reply)>(64);

    tokio::spawn(async move {
        let mut conn = pool
            .get()
            .expect("no connection available for the writer actor");

        while let Some((job, reply_tx)) = rx.recv().await {
            // The transaction closure works in StorageError so Diesel's own
            // errors convert with `?`; the boundary maps back to the core
            // error type. A job error rolls the whole transaction back.
            let result = conn
                .immediate_transaction::<_, StorageError, _>(|c| {
                    job(c).map_err(StorageError::from)
                })
                .map_err(|e: StorageError| e.into());

            // The caller may have given up waiting; that is not our problem.
            let _ = reply_tx.send(result);
        }
    });

    WriteHandle { tx }
}
