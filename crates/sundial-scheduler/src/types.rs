//! Scheduler types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Prefix for job keys derived from post identifiers.
pub const JOB_KEY_PREFIX: &str = "post-";

/// Derive the job key for a post identifier.
///
/// The mapping is deterministic and injective, so a post can never hold
/// more than one live job and upserts for the same post land on one key.
pub fn job_key(post_id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{post_id}")
}

/// A scheduled one-shot publish job.
///
/// Jobs are owned by the [`crate::JobStore`] once enqueued and are removed
/// from it atomically with dispatch; there is no recurring schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Store key (`post-` + post id).
    pub key: String,
    /// Identifier of the post to publish.
    pub post_id: String,
    /// When to fire.
    pub fire_at: DateTime<Utc>,
    /// When this job was enqueued.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a job for a post, deriving its key.
    pub fn new(post_id: impl Into<String>, fire_at: DateTime<Utc>) -> Self {
        let post_id = post_id.into();
        Self {
            key: job_key(&post_id),
            post_id,
            fire_at,
            created_at: Utc::now(),
        }
    }

    /// Check whether this job is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }

    /// Check whether this job missed its window: due more than `grace` ago.
    pub fn is_misfired(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.fire_at + grace < now
    }
}

/// Duplicate-handling mode for [`crate::JobStore::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueMode {
    /// Fail with `DuplicateJob` when a live job already holds the key.
    RejectIfExists,
    /// Atomically replace any live job holding the key.
    ReplaceIfExists,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_job_key_derivation() {
        assert_eq!(job_key("abc123"), "post-abc123");
        assert_eq!(Job::new("abc123", Utc::now()).key, "post-abc123");
    }

    #[test]
    fn test_job_due_at_boundary() {
        let now = Utc::now();
        let job = Job::new("p1", now);

        // Due exactly at fire_at, and any time after
        assert!(job.is_due(now));
        assert!(job.is_due(now + Duration::seconds(1)));
        assert!(!job.is_due(now - Duration::seconds(1)));
    }

    #[test]
    fn test_job_misfire_window() {
        let now = Utc::now();
        let grace = Duration::seconds(3600);
        let job = Job::new("p1", now - Duration::seconds(3599));

        // Inside the grace window the job still fires
        assert!(job.is_due(now));
        assert!(!job.is_misfired(now, grace));

        let stale = Job::new("p2", now - Duration::seconds(3601));
        assert!(stale.is_misfired(now, grace));
    }

    proptest! {
        // Keys are always prefixed and preserve the post id
        #[test]
        fn key_carries_prefix_and_id(post_id in "[a-zA-Z0-9_-]{1,40}") {
            let key = job_key(&post_id);
            prop_assert!(key.starts_with(JOB_KEY_PREFIX));
            prop_assert_eq!(&key[JOB_KEY_PREFIX.len()..], post_id.as_str());
        }

        // Distinct post ids never collide on a key
        #[test]
        fn key_is_injective(a in "[a-z0-9]{1,20}", b in "[a-z0-9]{1,20}") {
            prop_assert_eq!(job_key(&a) == job_key(&b), a == b);
        }

        // A job due in the future is never misfired
        #[test]
        fn future_job_never_misfired(offset_secs in 0i64..100_000) {
            let now = Utc::now();
            let job = Job::new("p", now + Duration::seconds(offset_secs));
            prop_assert!(!job.is_misfired(now, Duration::seconds(3600)));
        }

        // Misfired implies due
        #[test]
        fn misfired_implies_due(age_secs in 0i64..100_000, grace_secs in 0i64..10_000) {
            let now = Utc::now();
            let job = Job::new("p", now - Duration::seconds(age_secs));
            let grace = Duration::seconds(grace_secs);
            if job.is_misfired(now, grace) {
                prop_assert!(job.is_due(now));
            }
        }
    }
}
