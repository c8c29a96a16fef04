use crate::domain::{ProcessingKey, ProcessingRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::Result;

// Ports are the pluggable extension points for externally persisted state

/// Port for the processing-record store.
///
/// The store is shared with writers outside this process, so implementations
/// provide their own per-record atomicity; callers never rely on local locks.
/// Blocking I/O must be moved off the async worker threads, otherwise the
/// caller's deadline cannot cut a slow call short.
#[async_trait]
pub trait ProcessingStore: Send + Sync + 'static {
    /// Insert or replace the record for its `(resource_id, variant)` key
    async fn upsert(&self, record: ProcessingRecord) -> Result<()>;

    async fn fetch(&self, key: &ProcessingKey) -> Result<Option<ProcessingRecord>>;

    /// Remove a record, returning whether one was present
    async fn remove(&self, key: &ProcessingKey) -> Result<bool>;

    /// Remove the record only if it still carries `started_at`. A record
    /// refreshed by another worker in the meantime is left alone.
    async fn remove_if_started_at(
        &self,
        key: &ProcessingKey,
        started_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Remove every record with `started_at < cutoff`
    async fn remove_started_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}
