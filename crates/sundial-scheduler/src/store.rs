//! Durable job store.
//!
//! Jobs live in memory behind a mutex and are mirrored to a JSON file on
//! every mutation (temp file, then atomic rename), so live jobs survive a
//! process restart. `take_due` removes jobs atomically with dispatch, and
//! the in-flight key set keeps a key from firing twice concurrently.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::{EnqueueMode, Job, SchedulerError};

/// How long past its fire time a job may still fire.
///
/// Jobs that sat in the store longer than this while the process was down
/// are dropped; the catch-up reconciler re-derives them from the system of
/// record instead of firing them arbitrarily late.
pub const MISFIRE_GRACE_SECS: i64 = 3600;

/// Durable file format version.
const STORE_VERSION: u32 = 1;

/// Durable file format.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    jobs: HashMap<String, Job>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            jobs: HashMap::new(),
        }
    }
}

struct StoreState {
    jobs: HashMap<String, Job>,
    in_flight: HashSet<String>,
}

/// Durable mapping from job key to scheduled job.
///
/// All operations take the single state lock, so enqueue, cancel, and
/// `take_due` are atomic with respect to each other across the dispatcher,
/// the retry path, and the reconciler.
pub struct JobStore {
    path: PathBuf,
    state: Mutex<StoreState>,
    enqueued: Notify,
}

impl JobStore {
    /// Open the store, loading the durable file at `path` if one exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        let path = path.into();

        let file = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            let file: StoreFile = serde_json::from_str(&content)?;
            if file.version != STORE_VERSION {
                warn!(version = file.version, "unexpected job file version, loading anyway");
            }
            file
        } else {
            StoreFile::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(StoreState {
                jobs: file.jobs,
                in_flight: HashSet::new(),
            }),
            enqueued: Notify::new(),
        })
    }

    /// Insert a job under its key.
    ///
    /// `RejectIfExists` fails with `DuplicateJob` when the key is live;
    /// `ReplaceIfExists` swaps out any existing job. The durable file is
    /// updated before returning.
    pub async fn enqueue(&self, job: Job, mode: EnqueueMode) -> Result<(), SchedulerError> {
        let mut state = self.state.lock().await;

        if mode == EnqueueMode::RejectIfExists && state.jobs.contains_key(&job.key) {
            return Err(SchedulerError::DuplicateJob(job.key));
        }

        state.jobs.insert(job.key.clone(), job);
        self.persist(&state.jobs).await?;
        self.enqueued.notify_one();
        Ok(())
    }

    /// Wait until a job has been enqueued since the last call.
    ///
    /// Lets the dispatcher wake promptly for newly-scheduled work instead
    /// of sleeping out its full poll interval.
    pub async fn job_enqueued(&self) {
        self.enqueued.notified().await;
    }

    /// Remove the live job under `key`.
    pub async fn cancel(&self, key: &str) -> Result<(), SchedulerError> {
        let mut state = self.state.lock().await;

        if state.jobs.remove(key).is_none() {
            return Err(SchedulerError::JobNotFound(key.to_string()));
        }

        self.persist(&state.jobs).await
    }

    /// Get the live job under `key`.
    pub async fn get(&self, key: &str) -> Result<Job, SchedulerError> {
        self.state
            .lock()
            .await
            .jobs
            .get(key)
            .cloned()
            .ok_or_else(|| SchedulerError::JobNotFound(key.to_string()))
    }

    /// Check whether `key` has a live job or a firing still running.
    ///
    /// The reconciler uses this to avoid double-recovery: a key mid-firing
    /// has already left the store but must not be re-enqueued underneath
    /// its running attempt.
    pub async fn is_active(&self, key: &str) -> bool {
        let state = self.state.lock().await;
        state.jobs.contains_key(key) || state.in_flight.contains(key)
    }

    /// Number of live jobs.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    /// Earliest fire time among live jobs.
    pub async fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .await
            .jobs
            .values()
            .map(|j| j.fire_at)
            .min()
    }

    /// Remove and return every job due at `now` whose key is not in flight.
    ///
    /// Jobs past due by more than the misfire grace window are dropped
    /// rather than returned; recovering them is the reconciler's job.
    /// Returned keys are marked in flight and must be released with
    /// [`JobStore::end_flight`] once the firing completes.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>, SchedulerError> {
        let grace = Duration::seconds(MISFIRE_GRACE_SECS);
        let mut guard = self.state.lock().await;
        let StoreState { jobs, in_flight } = &mut *guard;

        let due_keys: Vec<String> = jobs
            .values()
            .filter(|j| j.is_due(now) && !in_flight.contains(&j.key))
            .map(|j| j.key.clone())
            .collect();

        let mut due = Vec::new();
        let mut removed = 0usize;
        for key in due_keys {
            let Some(job) = jobs.remove(&key) else {
                continue;
            };
            removed += 1;

            if job.is_misfired(now, grace) {
                warn!(
                    key = %job.key,
                    fire_at = %job.fire_at,
                    "dropping misfired job past grace window"
                );
                continue;
            }

            in_flight.insert(key);
            due.push(job);
        }

        if removed > 0 {
            self.persist(jobs).await?;
        }
        Ok(due)
    }

    /// Release a key taken by [`JobStore::take_due`] after its firing
    /// completes.
    pub async fn end_flight(&self, key: &str) {
        self.state.lock().await.in_flight.remove(key);
    }

    /// Write the job map to the durable file.
    async fn persist(&self, jobs: &HashMap<String, Job>) -> Result<(), SchedulerError> {
        #[derive(Serialize)]
        struct StoreFileRef<'a> {
            version: u32,
            jobs: &'a HashMap<String, Job>,
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&StoreFileRef {
            version: STORE_VERSION,
            jobs,
        })?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn job_in(post_id: &str, secs_from_now: i64) -> Job {
        Job::new(post_id, Utc::now() + Duration::seconds(secs_from_now))
    }

    #[tokio::test]
    async fn enqueue_reject_fails_on_duplicate() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json")).await.unwrap();

        store
            .enqueue(job_in("p1", 60), EnqueueMode::RejectIfExists)
            .await
            .unwrap();

        let err = store
            .enqueue(job_in("p1", 120), EnqueueMode::RejectIfExists)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateJob(_)));

        // The original job is untouched
        let job = store.get("post-p1").await.unwrap();
        assert!(job.fire_at < Utc::now() + Duration::seconds(90));
    }

    #[tokio::test]
    async fn enqueue_replace_upserts() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json")).await.unwrap();

        store
            .enqueue(job_in("p1", 60), EnqueueMode::ReplaceIfExists)
            .await
            .unwrap();
        store
            .enqueue(job_in("p1", 600), EnqueueMode::ReplaceIfExists)
            .await
            .unwrap();

        assert_eq!(store.pending_count().await, 1);
        let job = store.get("post-p1").await.unwrap();
        assert!(job.fire_at > Utc::now() + Duration::seconds(500));
    }

    #[tokio::test]
    async fn cancel_removes_and_reports_missing() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json")).await.unwrap();

        store
            .enqueue(job_in("p1", 60), EnqueueMode::RejectIfExists)
            .await
            .unwrap();
        store.cancel("post-p1").await.unwrap();

        assert!(matches!(
            store.get("post-p1").await.unwrap_err(),
            SchedulerError::JobNotFound(_)
        ));
        assert!(matches!(
            store.cancel("post-p1").await.unwrap_err(),
            SchedulerError::JobNotFound(_)
        ));
    }

    #[tokio::test]
    async fn jobs_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        {
            let store = JobStore::open(path.clone()).await.unwrap();
            store
                .enqueue(job_in("p1", 3600), EnqueueMode::RejectIfExists)
                .await
                .unwrap();
            store
                .enqueue(job_in("p2", 7200), EnqueueMode::RejectIfExists)
                .await
                .unwrap();
        }

        let store = JobStore::open(path).await.unwrap();
        assert_eq!(store.pending_count().await, 2);
        assert_eq!(store.get("post-p2").await.unwrap().post_id, "p2");
    }

    #[tokio::test]
    async fn take_due_removes_only_due_jobs() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json")).await.unwrap();

        store
            .enqueue(job_in("due", -5), EnqueueMode::RejectIfExists)
            .await
            .unwrap();
        store
            .enqueue(job_in("future", 3600), EnqueueMode::RejectIfExists)
            .await
            .unwrap();

        let due = store.take_due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].post_id, "due");

        // The due job left the store; the future one stayed
        assert_eq!(store.pending_count().await, 1);
        assert!(store.get("post-future").await.is_ok());
    }

    #[tokio::test]
    async fn take_due_skips_in_flight_keys() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json")).await.unwrap();

        store
            .enqueue(job_in("p1", -5), EnqueueMode::RejectIfExists)
            .await
            .unwrap();

        let first = store.take_due(Utc::now()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(store.is_active("post-p1").await);

        // Re-enqueued under the same key while the firing runs (retry path)
        store
            .enqueue(job_in("p1", -1), EnqueueMode::ReplaceIfExists)
            .await
            .unwrap();
        let second = store.take_due(Utc::now()).await.unwrap();
        assert!(second.is_empty());

        // Released: the pending job becomes eligible again
        store.end_flight("post-p1").await;
        let third = store.take_due(Utc::now()).await.unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn take_due_drops_misfired_jobs() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json")).await.unwrap();

        store
            .enqueue(
                job_in("stale", -(MISFIRE_GRACE_SECS + 10)),
                EnqueueMode::RejectIfExists,
            )
            .await
            .unwrap();

        let due = store.take_due(Utc::now()).await.unwrap();
        assert!(due.is_empty());
        // Dropped entirely, not left behind for a later pass
        assert_eq!(store.pending_count().await, 0);
        assert!(!store.is_active("post-stale").await);
    }

    #[tokio::test]
    async fn next_fire_at_is_earliest() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json")).await.unwrap();

        assert!(store.next_fire_at().await.is_none());

        let soon = Utc::now() + Duration::seconds(30);
        store
            .enqueue(Job::new("a", soon), EnqueueMode::RejectIfExists)
            .await
            .unwrap();
        store
            .enqueue(job_in("b", 3600), EnqueueMode::RejectIfExists)
            .await
            .unwrap();

        assert_eq!(store.next_fire_at().await, Some(soon));
    }
}
