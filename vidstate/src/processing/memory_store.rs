use crate::domain::{ProcessingKey, ProcessingRecord};
use crate::ports::ProcessingStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use shared::Result;

/// In-process processing store backed by `DashMap`.
///
/// Only deduplicates within one process; use a persistent store when several
/// workers share the work.
#[derive(Debug, Default)]
pub struct MemoryProcessingStore {
    records: DashMap<ProcessingKey, ProcessingRecord>,
}

impl MemoryProcessingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessingStore for MemoryProcessingStore {
    async fn upsert(&self, record: ProcessingRecord) -> Result<()> {
        self.records.insert(record.key(), record);
        Ok(())
    }

    async fn fetch(&self, key: &ProcessingKey) -> Result<Option<ProcessingRecord>> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, key: &ProcessingKey) -> Result<bool> {
        Ok(self.records.remove(key).is_some())
    }

    async fn remove_if_started_at(
        &self,
        key: &ProcessingKey,
        started_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .records
            .remove_if(key, |_, record| record.started_at == started_at)
            .is_some())
    }

    async fn remove_started_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.records.len();
        self.records.retain(|_, record| record.started_at >= cutoff);
        Ok(before.saturating_sub(self.records.len()))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn test_upsert_replaces_record() {
        let store = MemoryProcessingStore::new();
        let key = ProcessingKey::new("vid1", "720p");
        let first = Utc::now();
        let second = first + TimeDelta::seconds(30);

        store.upsert(ProcessingRecord::processing(&key, first)).await.unwrap();
        store.upsert(ProcessingRecord::processing(&key, second)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let fetched = store.fetch(&key).await.unwrap().unwrap();
        assert_eq!(fetched.started_at, second);
    }

    #[tokio::test]
    async fn test_remove_started_before() {
        let store = MemoryProcessingStore::new();
        let now = Utc::now();

        let old = ProcessingKey::new("vid1", "720p");
        let fresh = ProcessingKey::new("vid1", "1080p");
        store
            .upsert(ProcessingRecord::processing(&old, now - TimeDelta::minutes(20)))
            .await
            .unwrap();
        store.upsert(ProcessingRecord::processing(&fresh, now)).await.unwrap();

        let removed = store
            .remove_started_before(now - TimeDelta::minutes(10))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.fetch(&old).await.unwrap().is_none());
        assert!(store.fetch(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_reports_presence() {
        let store = MemoryProcessingStore::new();
        let key = ProcessingKey::new("vid1", "720p");

        assert!(!store.remove(&key).await.unwrap());
        store.upsert(ProcessingRecord::processing(&key, Utc::now())).await.unwrap();
        assert!(store.remove(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_if_started_at_keeps_refreshed_record() {
        let store = MemoryProcessingStore::new();
        let key = ProcessingKey::new("vid1", "720p");
        let stale = Utc::now() - TimeDelta::minutes(20);
        let fresh = Utc::now();

        store.upsert(ProcessingRecord::processing(&key, fresh)).await.unwrap();
        assert!(!store.remove_if_started_at(&key, stale).await.unwrap());
        assert!(store.fetch(&key).await.unwrap().is_some());

        assert!(store.remove_if_started_at(&key, fresh).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
