use serde_json::Value;
use shared::config::Config;
use std::path::Path;
use std::sync::Arc;
use storage_engine::SledProcessingStore;
use vidstate::{
    CacheConfig, MaskingConfig, MaskingProxy, MemoryProcessingStore, ProcessingStore,
    ProcessingTracker, SharedClock, StatsAggregator, TrackerConfig, TtlCache,
};

/// Resolver results cached as JSON documents
pub type ResponseCache = TtlCache<Value>;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ResponseCache>,
    pub masking: Arc<MaskingProxy>,
    pub tracker: Arc<ProcessingTracker>,
    pub stats: Arc<StatsAggregator<Value>>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn ProcessingStore>, clock: SharedClock) -> Self {
        let cache = Arc::new(TtlCache::new(
            CacheConfig::default()
                .with_default_ttl(config.cache_default_ttl)
                .with_sweep_interval(config.cache_sweep_interval)
                .with_max_entries(config.cache_max_entries),
            clock.clone(),
        ));

        let masking = Arc::new(MaskingProxy::new(
            MaskingConfig::default()
                .with_default_ttl(config.proxy_default_ttl)
                .with_sweep_interval(config.proxy_sweep_interval)
                .with_max_entries(config.proxy_max_entries),
            clock.clone(),
        ));

        let tracker = Arc::new(ProcessingTracker::new(
            store,
            clock.clone(),
            TrackerConfig::default()
                .with_stale_timeout(config.processing_stale_timeout)
                .with_call_deadline(config.store_deadline)
                .with_max_attempts(config.store_max_attempts),
        ));

        let stats = Arc::new(StatsAggregator::new(
            cache.clone(),
            masking.clone(),
            tracker.clone(),
            clock,
        ));

        Self {
            cache,
            masking,
            tracker,
            stats,
        }
    }

    /// Open the sled-backed processing store under `data_dir`, falling back to
    /// an in-memory store if it can't be opened.
    pub fn open_processing_store(config: &Config) -> Arc<dyn ProcessingStore> {
        let path = Path::new(&config.data_dir).join("processing.sled");

        match SledProcessingStore::open(&path) {
            Ok(store) => {
                tracing::info!("Processing store persisted at {}", path.display());
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize persistence: {}. Running in-memory mode.",
                    e
                );
                Arc::new(MemoryProcessingStore::new())
            }
        }
    }

    /// Start the cache and masking sweepers. Needs a running tokio runtime.
    pub fn start_sweepers(&self) -> shared::Result<()> {
        self.cache.start_sweeper()?;
        self.masking.start_sweeper()
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
        self.masking.shutdown().await;
    }
}
