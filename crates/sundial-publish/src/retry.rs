//! Per-post retry accounting.
//!
//! Counters live in memory only: a restart resets every count, so a post
//! mid-retry-sequence gets a fresh set of attempts afterwards. Counters are
//! keyed by post id rather than job key so they survive the job replacement
//! each retry performs.

use std::collections::HashMap;

use tokio::sync::Mutex;

/// Attempt counters for posts whose firing has failed at least once.
///
/// All access goes through the mutex; workers never touch the map directly.
#[derive(Debug, Default)]
pub struct RetryTracker {
    counts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of failed attempts recorded for a post (0 if none).
    pub async fn count(&self, post_id: &str) -> u32 {
        self.counts.lock().await.get(post_id).copied().unwrap_or(0)
    }

    /// Record a failed attempt, returning the updated count.
    pub async fn record_failure(&self, post_id: &str) -> u32 {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(post_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop tracking for a post (on success or after giving up).
    pub async fn clear(&self, post_id: &str) {
        self.counts.lock().await.remove(post_id);
    }
}
