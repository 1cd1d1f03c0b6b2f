//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// TTL value that is not a whole number of seconds or a `<digits><s|m|h|d|w>` string
    #[error("Invalid TTL format: {0}")]
    InvalidTtl(String),

    /// Increment/decrement applied to a value that is not an integer
    #[error("Value stored under '{0}' is not an integer")]
    NonNumericValue(String),

    /// Increment/decrement result does not fit in an i64
    #[error("Numeric overflow on key '{0}'")]
    NumericOverflow(String),

    /// `lock_and_run` could not obtain the lock
    #[error("Could not acquire lock: {0}")]
    LockNotAcquired(String),

    /// Invalid construction configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Payload could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure reported by a backing driver
    #[error("Cache backend error: {0}")]
    Backend(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
