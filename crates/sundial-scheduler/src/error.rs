//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A live job already holds the key.
    #[error("job already scheduled: {0}")]
    DuplicateJob(String),

    /// No live job holds the key.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Malformed input to a scheduling operation.
    #[error("invalid post id: {0}")]
    InvalidPostId(String),

    /// Failed to read or write the durable job file.
    #[error("job store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt durable job file.
    #[error("job store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
