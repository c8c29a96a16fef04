//! Cross-process "work in progress" markers.
//!
//! A worker about to do heavy work for `(resource_id, variant)` checks
//! [`ProcessingTracker::is_processing`], marks the pair, and clears it when it
//! is done. Markers older than the stale timeout are ignored and removed, so
//! a crashed worker cannot block retries forever.
//!
//! The tracker is an optimization only. Every store failure or timeout is
//! logged and turned into the answer that lets work proceed: `false` from
//! `is_processing`, `false` from mutations, `0` from cleanups.

use crate::clock::SharedClock;
use crate::domain::{ProcessingKey, ProcessingRecord};
use crate::ports::ProcessingStore;
use chrono::TimeDelta;
use shared::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub stale_timeout: Duration,
    /// Upper bound for one tracker operation, retries included
    pub call_deadline: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stale_timeout: Duration::from_secs(600),
            call_deadline: Duration::from_secs(10),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl TrackerConfig {
    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn with_call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = deadline;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

pub struct ProcessingTracker {
    store: Arc<dyn ProcessingStore>,
    clock: SharedClock,
    config: TrackerConfig,
}

impl ProcessingTracker {
    pub fn new(store: Arc<dyn ProcessingStore>, clock: SharedClock, config: TrackerConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record that work for the pair has started. Repeating the call
    /// refreshes the start time.
    pub async fn mark_processing(&self, resource_id: &str, variant: &str) -> bool {
        let key = ProcessingKey::new(resource_id, variant);
        if !accept(&key, "mark_processing") {
            return false;
        }

        let record = ProcessingRecord::processing(&key, self.clock.now_utc());
        let store = &self.store;
        let marked = self
            .call("mark_processing", move || store.upsert(record.clone()))
            .await
            .is_ok();

        if marked {
            debug!(key = %key, "Marked as processing");
        }
        marked
    }

    pub async fn is_processing(&self, resource_id: &str, variant: &str) -> bool {
        let key = ProcessingKey::new(resource_id, variant);
        if !accept(&key, "is_processing") {
            return false;
        }

        let store = &self.store;
        let key_ref = &key;
        let record = match self.call("is_processing", move || store.fetch(key_ref)).await {
            Ok(Some(record)) => record,
            Ok(None) | Err(_) => return false,
        };

        if !self.is_stale(&record) {
            return true;
        }

        info!(
            key = %key,
            started_at = %record.started_at,
            "Discarding stale processing record"
        );
        // Only the record we judged stale; a concurrent refresh survives
        let started_at = record.started_at;
        let _ = self
            .call("clear_stale", move || store.remove_if_started_at(key_ref, started_at))
            .await;
        false
    }

    /// Remove the marker once the work finished, successfully or not.
    pub async fn clear_processing(&self, resource_id: &str, variant: &str) -> bool {
        let key = ProcessingKey::new(resource_id, variant);
        if !accept(&key, "clear_processing") {
            return false;
        }

        let store = &self.store;
        let key_ref = &key;
        match self.call("clear_processing", move || store.remove(key_ref)).await {
            Ok(existed) => {
                debug!(key = %key, existed, "Cleared processing record");
                true
            }
            Err(_) => false,
        }
    }

    /// Remove every record started more than `older_than` ago.
    pub async fn cleanup_stale(&self, older_than: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| self.clock.now_utc().checked_sub_signed(age))
        else {
            warn!(older_than_secs = older_than.as_secs(), "Cleanup window out of range");
            return 0;
        };

        let store = &self.store;
        let removed = self
            .call("cleanup_stale", move || store.remove_started_before(cutoff))
            .await
            .unwrap_or(0);

        if removed > 0 {
            info!(removed, "Cleaned up stale processing records");
        }
        removed
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.cleanup_stale(self.config.stale_timeout).await
    }

    /// Records currently present in the store, stale ones included.
    /// `None` when the store cannot be reached.
    pub async fn active_count(&self) -> Option<usize> {
        let store = &self.store;
        self.call("count", move || store.count()).await.ok()
    }

    fn is_stale(&self, record: &ProcessingRecord) -> bool {
        let age = self.clock.now_utc().signed_duration_since(record.started_at);
        TimeDelta::from_std(self.config.stale_timeout)
            .map(|timeout| age > timeout)
            .unwrap_or(false)
    }

    /// Run a store operation with bounded retries under one overall deadline.
    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let backoff = self.config.retry_backoff;

        let retried = async {
            let mut last_error = None;
            for attempt in 1..=attempts {
                match f().await {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        debug!(op, attempt, error = %e, "Processing store call failed");
                        last_error = Some(e);
                        if attempt < attempts {
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
            Err(last_error.unwrap_or_else(|| Error::Internal(format!("{} made no attempts", op))))
        };

        let result = match tokio::time::timeout(self.config.call_deadline, retried).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} exceeded {:?}",
                op, self.config.call_deadline
            ))),
        };

        if let Err(e) = &result {
            warn!(op, error = %e, "Processing store unavailable, assuming not processing");
        }
        result
    }
}

fn accept(key: &ProcessingKey, op: &'static str) -> bool {
    if key.is_valid() {
        return true;
    }
    warn!(op, "Rejected processing call with empty resource id or variant");
    false
}

impl std::fmt::Debug for ProcessingTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingTracker")
            .field("config", &self.config)
            .finish()
    }
}
