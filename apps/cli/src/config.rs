//! Process configuration from environment variables.

use std::time::Duration;

use histsync_core::config::SyncConfig;
use histsync_core::executor::RetryPolicy;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::parse_timestamp;

/// Everything the binary needs beyond its arguments, loaded once at start.
pub struct AppConfig {
    /// Directory holding the database file.
    pub data_dir: String,
    /// Optional JSON file describing provider adapters.
    pub providers_file: Option<String>,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("HISTSYNC_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let providers_file = std::env::var("HISTSYNC_PROVIDERS").ok();

        let defaults = SyncConfig::default();
        let workers = env_parse("HISTSYNC_WORKERS", defaults.workers);
        let task_timeout = Duration::from_millis(env_parse(
            "HISTSYNC_TASK_TIMEOUT_MS",
            defaults.task_timeout.as_millis() as u64,
        ));
        let retry = RetryPolicy {
            max_attempts: env_parse("HISTSYNC_RETRY_ATTEMPTS", defaults.retry.max_attempts),
            ..defaults.retry
        };
        let earliest_start = std::env::var("HISTSYNC_EARLIEST_START")
            .ok()
            .and_then(|raw| parse_timestamp(&raw).ok());

        Self {
            data_dir,
            providers_file,
            sync: SyncConfig {
                workers,
                task_timeout,
                retry,
                earliest_start,
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Installs the global subscriber; `log` records from the library crates
/// are captured too.
pub fn init_tracing() {
    let log_format = std::env::var("HISTSYNC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // Touch only variables this test owns to stay parallel-safe.
        let config = AppConfig::from_env();
        assert!(config.sync.validate().is_ok());
        assert!(!config.data_dir.is_empty());
    }
}
