//! Client for the posts API that owns authoritative post status.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::PublishError;

/// Timeout for the scheduled-posts listing fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for post status updates.
const PATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum response body length echoed into logs and error messages.
const BODY_EXCERPT_LEN: usize = 500;

/// Client for the system-of-record posts API.
///
/// Sundial only consumes this API: it lists posts still marked "scheduled"
/// for catch-up and patches per-post status around a firing.
pub struct RecordsClient {
    http: Client,
    base_url: String,
}

impl RecordsClient {
    /// Create a client for the posts API at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetch the raw listing of posts with status "scheduled".
    ///
    /// Returns the decoded JSON body as-is; shape tolerance is the
    /// reconciler's concern.
    pub async fn list_scheduled(&self) -> Result<serde_json::Value, PublishError> {
        let url = format!("{}/posts", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("status", "scheduled")])
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Mark a post "publishing" ahead of the webhook call.
    pub async fn mark_publishing(&self, post_id: &str) -> Result<(), PublishError> {
        self.patch_status(post_id, json!({ "status": "publishing" }))
            .await?;
        info!(post_id, "marked post publishing");
        Ok(())
    }

    /// Mark a post "failed" after retries are exhausted.
    pub async fn mark_failed(
        &self,
        post_id: &str,
        error_message: &str,
    ) -> Result<(), PublishError> {
        self.patch_status(
            post_id,
            json!({ "status": "failed", "errorMessage": error_message }),
        )
        .await?;
        info!(post_id, error_message, "marked post failed");
        Ok(())
    }

    async fn patch_status(
        &self,
        post_id: &str,
        body: serde_json::Value,
    ) -> Result<(), PublishError> {
        let url = format!("{}/posts/{}", self.base_url, post_id);
        let response = self
            .http
            .patch(&url)
            .json(&body)
            .timeout(PATCH_TIMEOUT)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

/// Truncate a response body for logs and error messages.
pub(crate) fn excerpt(body: &str) -> String {
    if body.is_empty() {
        return "(empty)".to_string();
    }
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

/// Convert a non-success response into [`PublishError::Status`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PublishError::Status {
        status,
        body: excerpt(&body),
    })
}
