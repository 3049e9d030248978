//! Dispatch loop and worker pool.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{Job, JobStore};

/// Minimum sleep duration between dispatcher checks.
const MIN_SLEEP_SECS: u64 = 1;

/// Maximum sleep duration between dispatcher checks.
const MAX_SLEEP_SECS: u64 = 30;

/// Default number of firing workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Work queue size.
const QUEUE_SIZE: usize = 64;

/// Type alias for the job executor function.
pub type JobExecutor =
    Box<dyn Fn(Job) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

/// Fires due jobs from the store onto a bounded worker pool.
///
/// Jobs for different keys execute concurrently, capped by the pool size.
/// A key taken from the store stays in flight until its firing completes,
/// so a retry re-enqueued under the same key can never overlap the attempt
/// that scheduled it.
pub struct Dispatcher {
    store: Arc<JobStore>,
    worker_count: usize,
}

impl Dispatcher {
    /// Create a dispatcher over `store` with the default worker pool size.
    pub fn new(store: Arc<JobStore>) -> Self {
        Self {
            store,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }

    /// Set the worker pool size (minimum 1).
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Run the dispatch loop until shutdown.
    ///
    /// Executor results are logged and never propagated; job failure
    /// handling (retry, terminal reporting) happens inside the executor.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>, executor: JobExecutor) {
        info!(workers = self.worker_count, "dispatcher starting");

        let executor = Arc::new(executor);
        let (work_tx, work_rx) = mpsc::channel::<Job>(QUEUE_SIZE);
        let work_rx = Arc::new(Mutex::new(work_rx));

        // Spawn worker pool
        let mut worker_handles = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let work_rx = Arc::clone(&work_rx);
            let executor = Arc::clone(&executor);
            let store = Arc::clone(&self.store);
            let mut shutdown_rx = shutdown_rx.clone();

            let handle = tokio::spawn(async move {
                debug!(worker_id, "firing worker started");

                loop {
                    let job = {
                        let mut rx = work_rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => {
                                if *shutdown_rx.borrow() {
                                    break;
                                }
                                continue;
                            }
                            job = rx.recv() => job,
                        }
                    };

                    let Some(job) = job else {
                        // Channel closed
                        break;
                    };

                    let key = job.key.clone();
                    info!(worker_id, key = %key, post_id = %job.post_id, "worker firing job");

                    if let Err(e) = (*executor)(job).await {
                        error!(worker_id, key = %key, error = %e, "firing reported failure");
                    }

                    store.end_flight(&key).await;
                }

                debug!(worker_id, "firing worker stopped");
            });

            worker_handles.push(handle);
        }

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.store.take_due(Utc::now()).await {
                Ok(due) => {
                    for job in due {
                        if let Err(e) = work_tx.send(job).await {
                            warn!(key = %e.0.key, "worker pool closed, job dropped before firing");
                            break;
                        }
                    }
                }
                Err(e) => error!(error = %e, "failed to take due jobs"),
            }

            let sleep_duration = self.sleep_duration().await;
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = self.store.job_enqueued() => {}
                _ = sleep(sleep_duration) => {}
            }
        }

        // Closing the queue signals workers to drain and stop
        drop(work_tx);
        for handle in worker_handles {
            let _ = handle.await;
        }

        info!("dispatcher shut down");
    }

    /// How long to sleep until the next job could be due.
    async fn sleep_duration(&self) -> Duration {
        let secs = match self.store.next_fire_at().await {
            Some(next) => {
                let diff = (next - Utc::now()).num_seconds();
                (diff.max(MIN_SLEEP_SECS as i64) as u64).min(MAX_SLEEP_SECS)
            }
            None => MAX_SLEEP_SECS,
        };
        Duration::from_secs(secs)
    }
}
