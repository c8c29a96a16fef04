use crate::clock::{self, SharedClock};
use crate::domain::CacheStats;
use crate::sweeper::{Sweep, Sweeper};
use parking_lot::Mutex;
use shared::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_entries: Option<usize>, // None = unbounded
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            max_entries: Some(10_000),
        }
    }
}

impl CacheConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Cap the number of physically present entries. `Some(0)` is treated as unbounded.
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries.filter(|n| *n > 0);
        self
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    last_accessed_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        clock::is_expired(self.expires_at, now)
    }
}

struct CacheInner<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: SharedClock,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> CacheInner<V> {
    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Free a slot for a new key: expired entries go first, then the least
    /// recently accessed live ones.
    fn make_room(&self, entries: &mut HashMap<String, CacheEntry<V>>, now: Instant) {
        let Some(max_entries) = self.config.max_entries else {
            return;
        };
        if entries.len() < max_entries {
            return;
        }

        entries.retain(|_, entry| !entry.is_expired(now));

        while entries.len() >= max_entries {
            let Some(victim) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed_at)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            entries.remove(&victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %victim, "Evicted least recently used cache entry");
        }
    }
}

impl<V: Send + 'static> Sweep for CacheInner<V> {
    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

/// Thread-safe string-keyed cache with per-entry TTL.
///
/// Reads check expiry themselves, so a `get` never returns a dead entry even
/// if the background sweep has not run yet. The sweep only bounds how long
/// unread expired entries keep occupying memory.
pub struct TtlCache<V> {
    inner: Arc<CacheInner<V>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                clock,
                config,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Look up a live entry. An expired entry is removed before returning `None`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();

        match entries.get_mut(key) {
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed_at = now;
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        entries.remove(key);
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "Cache entry expired on read");
        None
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// A zero TTL is rejected rather than stored as already expired.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidInput("cache key must not be empty".to_string()));
        }
        if ttl.is_zero() {
            return Err(Error::InvalidTtl);
        }

        let now = self.inner.clock.now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| Error::InvalidInput(format!("ttl {:?} is out of range", ttl)))?;

        let mut entries = self.inner.entries.lock();
        if !entries.contains_key(&key) {
            self.inner.make_room(&mut entries, now);
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at,
                last_accessed_at: now,
            },
        );

        Ok(())
    }

    pub fn set_default(&self, key: impl Into<String>, value: V) -> Result<()> {
        self.set(key, value, self.inner.config.default_ttl)
    }

    /// Remove `key` whether or not it has expired.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.inner.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Physical entry count. Expired entries that were neither read nor swept
    /// yet are still counted.
    pub fn size(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Remaining lifetime of a live entry, without touching its access time.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = self.inner.clock.now();
        let entries = self.inner.entries.lock();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Age of a live entry since it was last written.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let now = self.inner.clock.now();
        let entries = self.inner.entries.lock();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| now - entry.created_at)
    }

    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.size(),
            self.inner.hits.load(Ordering::Relaxed),
            self.inner.misses.load(Ordering::Relaxed),
            self.inner.evictions.load(Ordering::Relaxed),
        )
    }

    /// Start the periodic sweep on the current tokio runtime. No-op if one is
    /// already running.
    pub fn start_sweeper(&self) -> Result<()> {
        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_some_and(Sweeper::is_running) {
            return Ok(());
        }

        *slot = Some(Sweeper::spawn(
            "cache",
            Arc::downgrade(&self.inner),
            self.inner.config.sweep_interval,
        )?);
        Ok(())
    }

    /// Stop the background sweep and wait for it to exit.
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entry_count", &self.inner.entries.lock().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn cache_with_clock() -> (TtlCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(CacheConfig::default(), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _) = cache_with_clock();

        cache.set("hello", "world".to_string(), Duration::from_secs(10)).unwrap();

        assert_eq!(cache.get("hello"), Some("world".to_string()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_get_missing() {
        let (cache, _) = cache_with_clock();
        assert_eq!(cache.get("nonexistent"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_expired_entry_is_absent_and_evicted_on_read() {
        let (cache, clock) = cache_with_clock();

        cache.set("k", "v".to_string(), Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(2));

        // Still physically present until read or swept
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_entry_expires_exactly_at_deadline() {
        let (cache, clock) = cache_with_clock();

        cache.set("k", "v".to_string(), Duration::from_secs(5)).unwrap();
        clock.advance(Duration::from_millis(4999));
        assert!(cache.get("k").is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_overwrite_resets_value_and_expiry() {
        let (cache, clock) = cache_with_clock();

        cache.set("key", "value1".to_string(), Duration::from_secs(10)).unwrap();
        clock.advance(Duration::from_secs(8));
        cache.set("key", "value2".to_string(), Duration::from_secs(10)).unwrap();

        assert_eq!(cache.age("key"), Some(Duration::ZERO));

        // Past the first entry's deadline, inside the second's
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("key"), Some("value2".to_string()));
        assert_eq!(cache.ttl_remaining("key"), Some(Duration::from_secs(5)));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let (cache, _) = cache_with_clock();

        let result = cache.set("k", "v".to_string(), Duration::ZERO);
        assert!(matches!(result, Err(Error::InvalidTtl)));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_empty_key_rejected() {
        let (cache, _) = cache_with_clock();

        let result = cache.set("", "v".to_string(), Duration::from_secs(1));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_set_default_uses_configured_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(
            CacheConfig::default().with_default_ttl(Duration::from_secs(30)),
            clock.clone(),
        );

        cache.set_default("k", 1u32).unwrap();
        assert_eq!(cache.ttl_remaining("k"), Some(Duration::from_secs(30)));

        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_delete_reports_presence_even_when_expired() {
        let (cache, clock) = cache_with_clock();

        cache.set("live", "a".to_string(), Duration::from_secs(10)).unwrap();
        cache.set("dead", "b".to_string(), Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(2));

        assert!(cache.delete("live"));
        assert!(cache.delete("dead"));
        assert!(!cache.delete("live"));
    }

    #[test]
    fn test_clear_returns_prior_size() {
        let (cache, _) = cache_with_clock();

        for i in 0..5 {
            cache.set(format!("k{}", i), "v".to_string(), Duration::from_secs(60)).unwrap();
        }

        assert_eq!(cache.clear(), 5);
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.clear(), 0);
    }

    #[test]
    fn test_purge_expired_only_removes_dead_entries() {
        let (cache, clock) = cache_with_clock();

        cache.set("short", "a".to_string(), Duration::from_secs(1)).unwrap();
        cache.set("long", "b".to_string(), Duration::from_secs(100)).unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("long"), Some("b".to_string()));
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(
            CacheConfig::default().with_max_entries(Some(2)),
            clock.clone(),
        );

        cache.set("key1", 1, Duration::from_secs(60)).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.set("key2", 2, Duration::from_secs(60)).unwrap();
        clock.advance(Duration::from_secs(1));

        // Touch key1 so key2 becomes the LRU entry
        assert_eq!(cache.get("key1"), Some(1));
        cache.set("key3", 3, Duration::from_secs(60)).unwrap();

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get("key2"), None);
        assert_eq!(cache.get("key1"), Some(1));
        assert_eq!(cache.get("key3"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_capacity_prefers_dropping_expired_entries() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(
            CacheConfig::default().with_max_entries(Some(2)),
            clock.clone(),
        );

        cache.set("old", 1, Duration::from_secs(60)).unwrap();
        cache.set("dying", 2, Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(2));
        cache.set("new", 3, Duration::from_secs(60)).unwrap();

        assert_eq!(cache.get("old"), Some(1));
        assert_eq!(cache.get("new"), Some(3));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(
            CacheConfig::default().with_max_entries(Some(1)),
            clock.clone(),
        );

        cache.set("only", 1, Duration::from_secs(60)).unwrap();
        cache.set("only", 2, Duration::from_secs(60)).unwrap();

        assert_eq!(cache.get("only"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_concurrent_set_get_delete() {
        let cache = Arc::new(TtlCache::new(
            CacheConfig::default().with_max_entries(None),
            Arc::new(ManualClock::new()),
        ));
        let threads = 8;

        thread::scope(|scope| {
            for t in 0..threads {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for i in 0..100 {
                        let own = format!("t{}-{}", t, i);
                        let value = format!("{}:{}", own, i);
                        cache.set(own.clone(), value, Duration::from_secs(60)).unwrap();

                        let shared = format!("shared-{}", i % 10);
                        let value = format!("{}:{}", shared, t);
                        cache.set(shared.clone(), value, Duration::from_secs(60)).unwrap();

                        // A value read back is always one that was stored for that key
                        if let Some(value) = cache.get(&shared) {
                            assert!(value.starts_with(&format!("{}:", shared)));
                        }
                        assert_eq!(cache.get(&own), Some(format!("{}:{}", own, i)));

                        if i % 2 == 0 {
                            assert!(cache.delete(&own));
                        }
                    }
                });
            }
        });

        assert_eq!(cache.size(), threads * 50 + 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_and_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(
            CacheConfig::default().with_sweep_interval(Duration::from_secs(60)),
            clock.clone(),
        );

        cache.set("k", "v".to_string(), Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(2));
        cache.start_sweeper().unwrap();
        // Starting twice keeps the existing task
        cache.start_sweeper().unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.size(), 0);

        cache.shutdown().await;

        cache.set("k", "v".to_string(), Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(cache.size(), 1);
    }
}
