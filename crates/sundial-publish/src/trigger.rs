//! The publish firing: mark the post "publishing", call the webhook, then
//! apply the retry state machine to the outcome.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use sundial_scheduler::{EnqueueMode, Job, JobExecutor, JobStore};

use crate::{PublishError, RecordsClient, RetryTracker, WebhookClient};

/// Maximum retries after the initial attempt (4 attempts total).
pub const MAX_RETRIES: u32 = 3;

/// Fixed delay between retry attempts.
pub const RETRY_DELAY_SECS: i64 = 120;

/// Tunable delivery parameters. Production uses the defaults; tests
/// compress the delays.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_delay: Duration::seconds(RETRY_DELAY_SECS),
        }
    }
}

/// Executes publish firings and owns the retry state machine.
///
/// Nothing here returns an error to the scheduling caller: a failed attempt
/// is either rescheduled under the same job key or terminally reported to
/// the system of record.
pub struct PublishTrigger {
    store: Arc<JobStore>,
    records: Arc<RecordsClient>,
    webhook: Arc<WebhookClient>,
    retries: Arc<RetryTracker>,
    config: TriggerConfig,
}

impl PublishTrigger {
    /// Create a trigger with the default retry parameters.
    pub fn new(
        store: Arc<JobStore>,
        records: Arc<RecordsClient>,
        webhook: Arc<WebhookClient>,
        retries: Arc<RetryTracker>,
    ) -> Self {
        Self {
            store,
            records,
            webhook,
            retries,
            config: TriggerConfig::default(),
        }
    }

    /// Override the retry parameters.
    pub fn with_config(mut self, config: TriggerConfig) -> Self {
        self.config = config;
        self
    }

    /// Fire the publish trigger for a post.
    ///
    /// The returned error is for the dispatcher's log line only; by the
    /// time this resolves, the outcome has already been applied (counter
    /// cleared, retry enqueued, or post marked failed).
    pub async fn fire(&self, post_id: &str) -> Result<(), String> {
        let count = self.retries.count(post_id).await;
        let attempt = count + 1;
        let total = self.config.max_retries + 1;
        info!(post_id, attempt, total, "firing publish trigger");

        // Best-effort: the webhook is still called when this fails.
        if let Err(e) = self.records.mark_publishing(post_id).await {
            warn!(post_id, error = %e, "failed to mark post publishing");
        }

        match self.webhook.trigger(post_id).await {
            Ok(()) => {
                self.retries.clear(post_id).await;
                info!(post_id, attempt, "publish trigger delivered");
                Ok(())
            }
            Err(e) => self.handle_failure(post_id, count, e).await,
        }
    }

    async fn handle_failure(
        &self,
        post_id: &str,
        count: u32,
        cause: PublishError,
    ) -> Result<(), String> {
        let attempt = count + 1;
        let total = self.config.max_retries + 1;
        error!(post_id, attempt, total, error = %cause, "publish trigger failed");

        if count < self.config.max_retries {
            let retry = self.retries.record_failure(post_id).await;
            let fire_at = Utc::now() + self.config.retry_delay;
            let job = Job::new(post_id, fire_at);
            let key = job.key.clone();

            if let Err(e) = self.store.enqueue(job, EnqueueMode::ReplaceIfExists).await {
                error!(key = %key, error = %e, "failed to enqueue retry");
                return Err(format!("failed to enqueue retry: {e}"));
            }

            info!(
                post_id,
                retry,
                max = self.config.max_retries,
                fire_at = %fire_at,
                "scheduled publish retry"
            );
            Ok(())
        } else {
            self.retries.clear(post_id).await;
            let message = format!("Failed after {total} attempts. Last error: {cause}");

            if let Err(e) = self.records.mark_failed(post_id, &message).await {
                error!(post_id, error = %e, "failed to mark post failed");
            }
            Err(message)
        }
    }

    /// Package this trigger as the dispatcher's executor callback.
    pub fn into_executor(self: Arc<Self>) -> JobExecutor {
        Box::new(move |job: Job| {
            let trigger = Arc::clone(&self);
            Box::pin(async move { trigger.fire(&job.post_id).await })
        })
    }
}
