//! The synchronization run: request in, per-task report out.

mod service;
mod types;

pub use service::SyncService;
pub use types::{EntitySelector, SyncReport, SyncRequest, TaskFailure};
