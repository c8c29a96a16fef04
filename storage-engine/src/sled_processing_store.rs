use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{Error, Result};
use sled::{IVec, Tree};
use std::path::Path;
use tracing::warn;
use vidstate::{ProcessingKey, ProcessingRecord, ProcessingStore};

const PROCESSING_TREE: &str = "processing";
const KEY_SEPARATOR: u8 = 0x1f;

/// Sled-backed processing store.
///
/// Records live in the `processing` tree keyed by `resource_id 0x1F variant`,
/// with the JSON-encoded [`ProcessingRecord`] as value. Each write is a single
/// atomic tree operation.
#[derive(Clone)]
pub struct SledProcessingStore {
    tree: Tree,
}

impl SledProcessingStore {
    /// Open (or create) the database at `path`
    /// Creates the parent directory if it doesn't exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open Sled database: {}", e)))?;

        Self::from_db(&db)
    }

    /// Use the `processing` tree of an already open database
    pub fn from_db(db: &sled::Db) -> Result<Self> {
        let tree = db
            .open_tree(PROCESSING_TREE)
            .map_err(|e| Error::Storage(format!("Failed to open processing tree: {}", e)))?;

        Ok(Self { tree })
    }

    pub fn flush(&self) -> Result<()> {
        self.tree
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }

    fn record_key(key: &ProcessingKey) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(key.resource_id.len() + key.variant.len() + 1);
        bytes.extend_from_slice(key.resource_id.as_bytes());
        bytes.push(KEY_SEPARATOR);
        bytes.extend_from_slice(key.variant.as_bytes());
        bytes
    }

    fn decode(bytes: &IVec) -> Result<ProcessingRecord> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Storage(format!("Failed to deserialize record: {}", e)))
    }

    /// Run a tree operation on the blocking pool so a slow disk never holds
    /// an async worker, and the caller's timeout can abandon the call.
    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(Tree) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tree = self.tree.clone();
        tokio::task::spawn_blocking(move || f(tree))
            .await
            .map_err(|e| Error::Storage(format!("{} task failed: {}", op, e)))?
    }
}

#[async_trait]
impl ProcessingStore for SledProcessingStore {
    async fn upsert(&self, record: ProcessingRecord) -> Result<()> {
        let key = Self::record_key(&record.key());
        let value = serde_json::to_vec(&record)
            .map_err(|e| Error::Storage(format!("Failed to serialize record: {}", e)))?;

        self.blocking("upsert", move |tree| {
            tree.insert(key, value)
                .map_err(|e| Error::Storage(format!("Failed to save record: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn fetch(&self, key: &ProcessingKey) -> Result<Option<ProcessingRecord>> {
        let key = Self::record_key(key);

        self.blocking("fetch", move |tree| {
            let value = tree
                .get(key)
                .map_err(|e| Error::Storage(format!("Failed to get record: {}", e)))?;

            match value {
                Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn remove(&self, key: &ProcessingKey) -> Result<bool> {
        let key = Self::record_key(key);

        self.blocking("remove", move |tree| {
            let removed = tree
                .remove(key)
                .map_err(|e| Error::Storage(format!("Failed to delete record: {}", e)))?
                .is_some();
            Ok(removed)
        })
        .await
    }

    async fn remove_if_started_at(
        &self,
        key: &ProcessingKey,
        started_at: DateTime<Utc>,
    ) -> Result<bool> {
        let key = Self::record_key(key);

        self.blocking("remove_if_started_at", move |tree| {
            let Some(current) = tree
                .get(&key)
                .map_err(|e| Error::Storage(format!("Failed to get record: {}", e)))?
            else {
                return Ok(false);
            };
            if Self::decode(&current)?.started_at != started_at {
                return Ok(false);
            }

            let swapped = tree
                .compare_and_swap(&key, Some(&current), None::<&[u8]>)
                .map_err(|e| Error::Storage(format!("Failed to delete record: {}", e)))?;
            Ok(swapped.is_ok())
        })
        .await
    }

    async fn remove_started_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.blocking("remove_started_before", move |tree| {
            let mut removed = 0;

            for result in tree.iter() {
                let (key, value) = result
                    .map_err(|e| Error::Storage(format!("Failed to iterate database: {}", e)))?;

                let record = match Self::decode(&value) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Skipping unreadable processing record: {}", e);
                        continue;
                    }
                };
                if record.started_at >= cutoff {
                    continue;
                }

                // Only delete the exact value we inspected; a concurrent refresh wins
                let swapped = tree
                    .compare_and_swap(&key, Some(&value), None::<&[u8]>)
                    .map_err(|e| Error::Storage(format!("Failed to delete record: {}", e)))?;
                if swapped.is_ok() {
                    removed += 1;
                }
            }

            Ok(removed)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.blocking("count", |tree| Ok(tree.len())).await
    }
}

impl std::fmt::Debug for SledProcessingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledProcessingStore")
            .field("records", &self.tree.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sled_processing_store_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledProcessingStore::open(temp_dir.path().join("processing.sled")).unwrap();

        let key = ProcessingKey::new("vid1", "720p");
        let record = ProcessingRecord::processing(&key, Utc::now());

        // Upsert
        store.upsert(record.clone()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        // Fetch
        let fetched = store.fetch(&key).await.unwrap();
        assert_eq!(fetched, Some(record));

        // Other variants are separate records
        let other = ProcessingKey::new("vid1", "1080p");
        assert!(store.fetch(&other).await.unwrap().is_none());

        // Remove
        assert!(store.remove(&key).await.unwrap());
        assert!(!store.remove(&key).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledProcessingStore::open(temp_dir.path().join("processing.sled")).unwrap();

        let key = ProcessingKey::new("vid1", "720p");
        let first = Utc::now();
        let second = first + TimeDelta::minutes(5);

        store.upsert(ProcessingRecord::processing(&key, first)).await.unwrap();
        store.upsert(ProcessingRecord::processing(&key, second)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.fetch(&key).await.unwrap().unwrap().started_at, second);
    }

    #[tokio::test]
    async fn test_stores_sharing_a_database_see_each_other() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("processing.sled")).unwrap();
        let worker_a = SledProcessingStore::from_db(&db).unwrap();
        let worker_b = SledProcessingStore::from_db(&db).unwrap();
        let key = ProcessingKey::new("vid1", "720p");

        worker_a
            .upsert(ProcessingRecord::processing(&key, Utc::now()))
            .await
            .unwrap();
        worker_a.flush().unwrap();

        assert!(worker_b.fetch(&key).await.unwrap().is_some());
        assert!(worker_b.remove(&key).await.unwrap());
        assert!(worker_a.fetch(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persisted_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("processing.sled")).unwrap();
        let store = SledProcessingStore::from_db(&db).unwrap();

        let key = ProcessingKey::new("vid1", "720p");
        store
            .upsert(ProcessingRecord::processing(&key, Utc::now()))
            .await
            .unwrap();

        let raw = db
            .open_tree(PROCESSING_TREE)
            .unwrap()
            .get(b"vid1\x1f720p")
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["status"], "processing");
        assert!(json["started_at"].is_string());
    }

    #[tokio::test]
    async fn test_remove_started_before() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledProcessingStore::open(temp_dir.path().join("processing.sled")).unwrap();
        let now = Utc::now();

        for variant in ["360p", "480p"] {
            let key = ProcessingKey::new("old", variant);
            store
                .upsert(ProcessingRecord::processing(&key, now - TimeDelta::minutes(30)))
                .await
                .unwrap();
        }
        let fresh = ProcessingKey::new("fresh", "720p");
        store
            .upsert(ProcessingRecord::processing(&fresh, now))
            .await
            .unwrap();

        let removed = store
            .remove_started_before(now - TimeDelta::minutes(10))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.fetch(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_if_started_at() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledProcessingStore::open(temp_dir.path().join("processing.sled")).unwrap();
        let key = ProcessingKey::new("vid1", "720p");
        let stale = Utc::now() - TimeDelta::minutes(20);
        let refreshed = Utc::now();

        store
            .upsert(ProcessingRecord::processing(&key, refreshed))
            .await
            .unwrap();

        // Another worker refreshed the record after it was read as stale
        assert!(!store.remove_if_started_at(&key, stale).await.unwrap());
        assert!(store.fetch(&key).await.unwrap().is_some());

        assert!(store.remove_if_started_at(&key, refreshed).await.unwrap());
        assert!(store.fetch(&key).await.unwrap().is_none());
        assert!(!store.remove_if_started_at(&key, refreshed).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_tree_call_does_not_hold_the_caller() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledProcessingStore::open(temp_dir.path().join("processing.sled")).unwrap();

        let started = std::time::Instant::now();
        let slow = store.blocking("slow", |tree| {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(tree.len())
        });
        let result = tokio::time::timeout(Duration::from_millis(100), slow).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
