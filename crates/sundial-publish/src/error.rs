//! Error types for publish delivery.

use thiserror::Error;

/// Errors from the system-of-record API or the publishing webhook.
///
/// These are transient delivery errors from the scheduler's point of view:
/// they are consumed by the retry state machine and never surface to the
/// caller that scheduled the post.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}
