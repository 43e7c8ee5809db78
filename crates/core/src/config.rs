//! Engine configuration.
//!
//! Everything tunable about a synchronization run lives in [`SyncConfig`],
//! built explicitly at process start and passed into the service. There is
//! no ambient global configuration.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::constants::{DEFAULT_TASK_TIMEOUT, DEFAULT_WORKERS};
use crate::errors::ValidationError;
use crate::executor::RetryPolicy;

/// Tunables for the executor and the request window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound on concurrently running fetch tasks. Dispatch rate is
    /// still capped by the provider's rate limiter regardless of workers.
    pub workers: usize,

    /// Hard timeout for one provider call; elapsing counts as a transient
    /// failure.
    pub task_timeout: Duration,

    /// Retry behavior for transient failures.
    pub retry: RetryPolicy,

    /// Optional floor for requested windows. Requests starting earlier are
    /// clamped up to this instant, e.g. an exchange founding date.
    pub earliest_start: Option<DateTime<Utc>>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            retry: RetryPolicy::default(),
            earliest_start: None,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::InvalidConfig(
                "workers must be positive".to_string(),
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(ValidationError::InvalidConfig(
                "task_timeout must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ValidationError::InvalidConfig(
                "retry.max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
