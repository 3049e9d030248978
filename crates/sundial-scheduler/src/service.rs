//! Scheduling operations consumed by the routing layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::{EnqueueMode, Job, JobStore, SchedulerError, job_key};

/// Receipt returned by scheduling operations.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReceipt {
    pub job_id: String,
    pub post_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: &'static str,
}

/// Health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub scheduler_running: bool,
    pub pending_jobs: usize,
}

/// The scheduling API: create, cancel, reschedule, query, health.
///
/// Constructed once at startup and shared by reference; there is no
/// process-global scheduler handle.
pub struct ScheduleService {
    store: Arc<JobStore>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ScheduleService {
    /// Create the service over `store`.
    ///
    /// `shutdown_rx` is the daemon's shutdown signal; health reports the
    /// scheduler as running until it flips.
    pub fn new(store: Arc<JobStore>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self { store, shutdown_rx }
    }

    fn validate(post_id: &str) -> Result<(), SchedulerError> {
        if post_id.trim().is_empty() {
            return Err(SchedulerError::InvalidPostId(
                "post id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Schedule a post; fails if one is already scheduled.
    pub async fn create(
        &self,
        post_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<ScheduleReceipt, SchedulerError> {
        Self::validate(post_id)?;

        let job = Job::new(post_id, scheduled_at);
        let job_id = job.key.clone();
        self.store.enqueue(job, EnqueueMode::RejectIfExists).await?;

        info!(job_id = %job_id, scheduled_at = %scheduled_at, "scheduled post");
        Ok(ScheduleReceipt {
            job_id,
            post_id: post_id.to_string(),
            scheduled_at,
            status: "scheduled",
        })
    }

    /// Cancel a scheduled post.
    pub async fn cancel(&self, post_id: &str) -> Result<(), SchedulerError> {
        Self::validate(post_id)?;
        self.store.cancel(&job_key(post_id)).await?;
        info!(post_id, "cancelled schedule");
        Ok(())
    }

    /// Move a post to a new time, creating the schedule if absent.
    pub async fn reschedule(
        &self,
        post_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<ScheduleReceipt, SchedulerError> {
        Self::validate(post_id)?;

        let job = Job::new(post_id, scheduled_at);
        let job_id = job.key.clone();
        self.store.enqueue(job, EnqueueMode::ReplaceIfExists).await?;

        info!(job_id = %job_id, scheduled_at = %scheduled_at, "rescheduled post");
        Ok(ScheduleReceipt {
            job_id,
            post_id: post_id.to_string(),
            scheduled_at,
            status: "rescheduled",
        })
    }

    /// Look up the live schedule for a post.
    pub async fn query(&self, post_id: &str) -> Result<ScheduleReceipt, SchedulerError> {
        Self::validate(post_id)?;

        let job = self.store.get(&job_key(post_id)).await?;
        Ok(ScheduleReceipt {
            job_id: job.key,
            post_id: job.post_id,
            scheduled_at: job.fire_at,
            status: "scheduled",
        })
    }

    /// Report whether the scheduler is running and how many jobs are live.
    pub async fn health(&self) -> Health {
        let scheduler_running = !*self.shutdown_rx.borrow();
        let pending_jobs = self.store.pending_count().await;
        Health {
            scheduler_running,
            pending_jobs,
        }
    }
}
