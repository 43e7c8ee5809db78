//! Error types for the synchronization engine.
//!
//! This module defines storage-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.
//! Provider adapters return [`ProviderError`], whose [`retry_class`](ProviderError::retry_class)
//! tells the executor whether a failed attempt is worth repeating.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Type alias for results returned by provider adapter calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Root error type for the synchronization engine.
///
/// Storage-specific errors are wrapped in string form by the storage layer to
/// keep this type database-agnostic.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Provider operation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Persistence operation failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors returned by provider adapters.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines whether the
/// executor retries the attempt with backoff or fails the task immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider call did not complete within the configured timeout.
    /// Transient: a later attempt may succeed.
    #[error("Timeout after {elapsed_ms}ms: {provider}")]
    Timeout { provider: String, elapsed_ms: u64 },

    /// The provider rate limited the request (HTTP 429 or equivalent).
    /// Transient: backs off and retries.
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String, message: String },

    /// The provider is temporarily unavailable (5xx, maintenance window).
    /// Transient: backs off and retries.
    #[error("Provider unavailable: {provider} - {message}")]
    Unavailable { provider: String, message: String },

    /// A network error occurred while communicating with the provider.
    /// Transient: connection resets and DNS hiccups usually clear up.
    #[error("Network error: {provider} - {message}")]
    Network { provider: String, message: String },

    /// The provider rejected the request (bad parameters, auth failure).
    /// Permanent: retrying the same request cannot help.
    #[error("Request rejected: {provider} - {message}")]
    InvalidRequest { provider: String, message: String },

    /// The provider does not recognize one of the requested entities.
    /// Permanent.
    #[error("Entity '{entity}' not supported by provider: {provider}")]
    UnsupportedEntity { provider: String, entity: String },

    /// The adapter does not implement the requested fetch surface.
    /// Permanent: a planning bug or a misdeclared capability.
    #[error("Operation '{operation}' not supported by provider: {provider}")]
    NotSupported { provider: String, operation: String },

    /// The provider returned data the adapter could not decode.
    /// Permanent: the same response would fail the same way.
    #[error("Malformed response: {provider} - {message}")]
    Malformed { provider: String, message: String },
}

/// Classification for retry policy.
///
/// Used to determine how the executor should respond to errors from providers.
///
/// # Behavior Summary
///
/// | Class | Retried? | Backoff |
/// |-------|----------|---------|
/// | `Transient` | Yes, up to the attempt cap | Exponential, capped |
/// | `Permanent` | No | - |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// The failure may clear up on its own; retry with exponential backoff.
    Transient,

    /// Retrying the identical request cannot succeed; fail the task now.
    Permanent,
}

impl RetryClass {
    pub fn is_transient(self) -> bool {
        matches!(self, RetryClass::Transient)
    }
}

impl ProviderError {
    /// Returns the retry classification for this error.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient errors - retry with backoff
            Self::Timeout { .. }
            | Self::RateLimited { .. }
            | Self::Unavailable { .. }
            | Self::Network { .. } => RetryClass::Transient,

            // Terminal errors - fail the task immediately
            Self::InvalidRequest { .. }
            | Self::UnsupportedEntity { .. }
            | Self::NotSupported { .. }
            | Self::Malformed { .. } => RetryClass::Permanent,
        }
    }

    /// The provider id the error originated from.
    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Unavailable { provider, .. }
            | Self::Network { provider, .. }
            | Self::InvalidRequest { provider, .. }
            | Self::UnsupportedEntity { provider, .. }
            | Self::NotSupported { provider, .. }
            | Self::Malformed { provider, .. } => provider,
        }
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate key).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data could not be serialized or deserialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal/unexpected storage error.
    #[error("Internal storage error: {0}")]
    Internal(String),
}

/// Validation errors for requests and configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid interval: start {start} is not before end {end}")]
    InvalidInterval { start: String, end: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("No entities to synchronize: {0}")]
    NoEntities(String),

    #[error("Invalid limits for provider '{provider}': {message}")]
    InvalidLimits { provider: String, message: String },

    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse date/time: {0}")]
    InvalidTimestamp(String),
}

// === From implementations for common error types ===

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Persistence(PersistenceError::Io(err.to_string()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Persistence(PersistenceError::Serialization(err.to_string()))
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Self {
        Error::Validation(ValidationError::InvalidTimestamp(err.to_string()))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        let error = ProviderError::Timeout {
            provider: "tushare".to_string(),
            elapsed_ms: 30_000,
        };
        assert_eq!(error.retry_class(), RetryClass::Transient);
        assert!(error.retry_class().is_transient());
    }

    #[test]
    fn test_rate_limited_is_transient() {
        let error = ProviderError::RateLimited {
            provider: "tushare".to_string(),
            message: "429".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Transient);
    }

    #[test]
    fn test_unavailable_is_transient() {
        let error = ProviderError::Unavailable {
            provider: "flatfile".to_string(),
            message: "disk detached".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Transient);
    }

    #[test]
    fn test_network_is_transient() {
        let error = ProviderError::Network {
            provider: "vendor".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Transient);
    }

    #[test]
    fn test_invalid_request_is_permanent() {
        let error = ProviderError::InvalidRequest {
            provider: "vendor".to_string(),
            message: "bad API key".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Permanent);
        assert!(!error.retry_class().is_transient());
    }

    #[test]
    fn test_unsupported_entity_is_permanent() {
        let error = ProviderError::UnsupportedEntity {
            provider: "vendor".to_string(),
            entity: "BOGUS".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Permanent);
    }

    #[test]
    fn test_not_supported_is_permanent() {
        let error = ProviderError::NotSupported {
            provider: "vendor".to_string(),
            operation: "fetch_by_time".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Permanent);
    }

    #[test]
    fn test_malformed_is_permanent() {
        let error = ProviderError::Malformed {
            provider: "vendor".to_string(),
            message: "expected array".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Permanent);
    }

    #[test]
    fn test_provider_accessor() {
        let error = ProviderError::Timeout {
            provider: "tushare".to_string(),
            elapsed_ms: 100,
        };
        assert_eq!(error.provider(), "tushare");
    }

    #[test]
    fn test_error_display() {
        let error = ProviderError::RateLimited {
            provider: "tushare".to_string(),
            message: "slow down".to_string(),
        };
        assert_eq!(format!("{}", error), "Rate limited: tushare");

        let error = ProviderError::NotSupported {
            provider: "flatfile".to_string(),
            operation: "fetch_by_time".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Operation 'fetch_by_time' not supported by provider: flatfile"
        );
    }

    #[test]
    fn test_provider_error_wraps_into_root_error() {
        let error: Error = ProviderError::Timeout {
            provider: "vendor".to_string(),
            elapsed_ms: 5,
        }
        .into();
        assert!(matches!(error, Error::Provider(_)));
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError::UnknownProvider("ghost".to_string());
        assert_eq!(format!("{}", error), "Unknown provider: ghost");
    }
}
