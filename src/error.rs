//! Error types for rankstore
//!
//! The hierarchy separates the four failure classes the loader and the
//! queries can meet:
//! - Store errors (connection loss, failed commands)
//! - Malformed input records, which are always skipped and never fatal
//! - Ingestion aborts, which carry the progress made before the failure
//! - Configuration errors
//!
//! Absence of data is never an error: queries return `Option` or an empty
//! collection instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for rankstore
#[derive(Error, Debug)]
pub enum RankError {
    /// Store (Redis) errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Ingestion pipeline errors
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a key-value store session
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Store unreachable, or the ping after connecting failed
    #[error("Failed to connect to store at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Connecting did not finish in time
    #[error("Connecting to store at '{url}' timed out after {}s", .after.as_secs())]
    Timeout { url: String, after: Duration },

    /// A command was rejected by the store
    #[error("Store operation failed: {0}")]
    OperationFailed(String),

    /// Redis client error
    #[error("Redis error: {0}")]
    Redis(String),
}

impl StoreError {
    /// Check if this error means the store can no longer be reached
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailed { .. } | StoreError::Timeout { .. }
        )
    }
}

impl StoreError {
    /// Attach the store URL to a connection error built without one
    pub fn at_url(self, url: &str) -> Self {
        match self {
            StoreError::ConnectionFailed { reason, .. } => StoreError::ConnectionFailed {
                url: url.to_string(),
                reason,
            },
            StoreError::Timeout { after, .. } => StoreError::Timeout {
                url: url.to_string(),
                after,
            },
            other => other,
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            StoreError::ConnectionFailed {
                url: "redis".to_string(),
                reason: err.to_string(),
            }
        } else {
            StoreError::Redis(err.to_string())
        }
    }
}

/// A single input record that could not be turned into a write.
///
/// These never abort a load; the pipeline logs them and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Line was empty after trimming
    #[error("empty line")]
    Blank,

    /// Line carried a key but no complete field/value pair
    #[error("no field/value pairs for '{key}'")]
    NoFields { key: String },

    /// Row lacks a user or leaderboard id
    #[error("missing {column}")]
    MissingId { column: &'static str },

    /// Score is not a finite-or-infinite number
    #[error("invalid score '{value}'")]
    InvalidScore { value: String },

    /// Row could not be decoded by the CSV reader
    #[error("unreadable row: {0}")]
    Unreadable(String),
}

/// Errors that abort an ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    /// Failed to open or read the input
    #[error("Failed to read '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    /// Header row could not be read
    #[error("Failed to read CSV header: {0}")]
    Csv(String),

    /// Header row is missing a required column
    #[error("Missing required column '{0}'")]
    MissingColumn(&'static str),

    /// A batch flush failed; everything up to the previous flush is committed
    #[error(
        "Commit failed while loading {dataset}: {committed} of {staged} records committed: {source}"
    )]
    CommitFailed {
        dataset: &'static str,
        committed: u64,
        staged: u64,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    /// Records known to be committed before the run aborted
    pub fn committed(&self) -> u64 {
        match self {
            IngestError::CommitFailed { committed, .. } => *committed,
            _ => 0,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Batch size out of range
    #[error("Invalid batch size {size}: must be between 1 and {max}")]
    InvalidBatchSize { size: usize, max: usize },

    /// Scan page size out of range
    #[error("Invalid page size {size}: must be between 1 and {max}")]
    InvalidPageSize { size: usize, max: usize },

    /// Redis URL could not be parsed
    #[error("Invalid Redis URL '{url}': {reason}")]
    InvalidRedisUrl { url: String, reason: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RankError>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for ingestion runs
pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failure_classification() {
        let err = StoreError::ConnectionFailed {
            url: "redis://127.0.0.1:6379".into(),
            reason: "refused".into(),
        };
        assert!(err.is_connection_failure());
        assert!(!StoreError::OperationFailed("WRONGTYPE".into()).is_connection_failure());
    }

    #[test]
    fn test_redis_io_error_keeps_store_url() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = StoreError::from(redis::RedisError::from(io)).at_url("redis://cache:6380");
        match err {
            StoreError::ConnectionFailed { url, reason } => {
                assert_eq!(url, "redis://cache:6380");
                assert!(reason.contains("reset by peer"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = StoreError::OperationFailed("WRONGTYPE".into()).at_url("redis://cache:6380");
        assert!(matches!(err, StoreError::OperationFailed(_)));
    }

    #[test]
    fn test_commit_failed_reports_progress() {
        let err = IngestError::CommitFailed {
            dataset: "users",
            committed: 200,
            staged: 250,
            source: StoreError::OperationFailed("EXECABORT".into()),
        };
        assert_eq!(err.committed(), 200);
        let msg = err.to_string();
        assert!(msg.contains("200 of 250"));
        assert!(msg.contains("users"));
    }
}
