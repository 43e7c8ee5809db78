use std::time::Duration;

/// Default bound on concurrently running fetch tasks
pub const DEFAULT_WORKERS: usize = 4;

/// Default hard bound on a single provider call
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default total attempts for a transiently failing task, first try included
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// First retry backoff; doubles after each transient failure
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Ceiling for exponential backoff growth
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Rate limit applied to providers without a configured bucket
pub const DEFAULT_QPS: u32 = 5;
