//! Catch-up reconciliation for posts that missed their scheduled time.
//!
//! Runs once at startup and then on a fixed interval, querying the system
//! of record for posts still marked "scheduled" whose time has passed and
//! re-enqueuing any that have no live job. This is the recovery path for
//! jobs dropped by the misfire policy and for anything lost to downtime.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use sundial_scheduler::{EnqueueMode, Job, JobStore, job_key};

use crate::RecordsClient;

/// Seconds between periodic reconciliation passes.
pub const CATCH_UP_INTERVAL_SECS: u64 = 300;

/// Settling delay applied to recovered posts so a burst of missed work does
/// not re-fire all at once right after recovery.
pub const CATCH_UP_DELAY_SECS: i64 = 30;

/// Re-derives missed publish jobs from the system of record.
pub struct Reconciler {
    store: Arc<JobStore>,
    records: Arc<RecordsClient>,
    settle_delay: Duration,
}

impl Reconciler {
    /// Create a reconciler with the default settling delay.
    pub fn new(store: Arc<JobStore>, records: Arc<RecordsClient>) -> Self {
        Self {
            store,
            records,
            settle_delay: Duration::seconds(CATCH_UP_DELAY_SECS),
        }
    }

    /// Override the settling delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Run one reconciliation pass, returning how many posts were recovered.
    ///
    /// Never fails: an unreachable system of record yields zero recovered,
    /// and the next pass tries again.
    pub async fn reconcile(&self) -> usize {
        let listing = match self.records.list_scheduled().await {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "failed to fetch scheduled posts for catch-up");
                return 0;
            }
        };

        let posts = decode_listing(listing);
        let now = Utc::now();
        let mut recovered = 0;

        for post in &posts {
            let Some(post_id) = post.get("id").and_then(Value::as_str) else {
                continue;
            };

            let raw = post
                .get("scheduledAt")
                .or_else(|| post.get("scheduled_at"))
                .and_then(Value::as_str);
            let Some(raw) = raw else {
                continue;
            };

            let Some(scheduled_at) = parse_scheduled_at(raw) else {
                warn!(post_id, raw, "could not parse scheduled time, skipping");
                continue;
            };

            // Nothing missed yet
            if scheduled_at >= now {
                continue;
            }

            let key = job_key(post_id);
            if self.store.is_active(&key).await {
                debug!(post_id, "post already has a pending job, skipping");
                continue;
            }

            let fire_at = now + self.settle_delay;
            let job = Job::new(post_id, fire_at);
            if let Err(e) = self.store.enqueue(job, EnqueueMode::ReplaceIfExists).await {
                error!(post_id, error = %e, "failed to re-enqueue missed post");
                continue;
            }

            recovered += 1;
            info!(
                post_id,
                was_due = %scheduled_at,
                fire_at = %fire_at,
                "recovered missed post"
            );
        }

        if recovered > 0 {
            info!(recovered, "catch-up complete");
        } else {
            info!("catch-up complete: no missed posts found");
        }
        recovered
    }

    /// Run reconciliation once immediately, then every `interval_secs`
    /// until shutdown.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>, interval_secs: u64) {
        let recovered = self.reconcile().await;
        info!(recovered, "startup catch-up finished");

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        // The first tick completes immediately; the startup pass just ran.
        interval.reset();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.reconcile().await;
                }
            }
        }

        info!("reconciler shut down");
    }
}

/// Decode the scheduled-posts listing.
///
/// The API has returned both a bare array and an object wrapping the array
/// under `posts`; both are accepted. Any other shape decodes to an empty
/// list.
fn decode_listing(value: Value) -> Vec<Value> {
    match value {
        Value::Array(posts) => posts,
        Value::Object(mut map) => match map.remove("posts") {
            Some(Value::Array(posts)) => posts,
            _ => {
                debug!("scheduled-posts listing had an unexpected shape");
                Vec::new()
            }
        },
        _ => {
            debug!("scheduled-posts listing had an unexpected shape");
            Vec::new()
        }
    }
}

/// Parse a scheduled timestamp.
///
/// Accepts RFC 3339 with `Z` or an explicit offset; a timestamp with no
/// timezone information at all is taken as UTC.
fn parse_scheduled_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
