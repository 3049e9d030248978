//! Client for the downstream publishing webhook.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::PublishError;
use crate::records::{check_status, excerpt};

/// Timeout for the webhook call. Publishing can be slow downstream, so this
/// is longer than the status-update timeout.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Client that triggers the downstream publishing workflow.
pub struct WebhookClient {
    http: Client,
    url: String,
}

impl WebhookClient {
    /// Create a client for the webhook at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            url: url.into(),
        }
    }

    /// Trigger publishing for a post.
    ///
    /// Any transport error or non-2xx response is a delivery failure for
    /// retry purposes.
    pub async fn trigger(&self, post_id: &str) -> Result<(), PublishError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "postId": post_id }))
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await?;

        let status = response.status().as_u16();
        let response = check_status(response).await?;
        let body = response.text().await.unwrap_or_default();
        info!(post_id, status, body = %excerpt(&body), "webhook accepted publish trigger");
        Ok(())
    }
}
