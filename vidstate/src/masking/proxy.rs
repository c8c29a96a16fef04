//! Opaque-id masking for upstream download URLs.
//!
//! The request layer hands over the resolver's real URL and a label and gets
//! back an unguessable id to embed in its own redirect path
//! (`/api/proxy/{id}/{label}`). Resolving the id later yields the real URL and
//! bumps the access counters. This is a URL-to-URL mapping only, never a
//! content cache.

use crate::clock::{self, SharedClock};
use crate::domain::{MaskedUrlView, ProxyStats};
use crate::masking::id::{IdSource, RandomIdSource};
use crate::sweeper::{Sweep, Sweeper};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_DISPLAY_NAME: &str = "video";

#[derive(Clone, Debug)]
pub struct MaskingConfig {
    pub default_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_entries: Option<usize>, // None = unbounded
    pub max_id_attempts: u32,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            max_entries: Some(50_000),
            max_id_attempts: 5,
        }
    }
}

impl MaskingConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// `Some(0)` is treated as unbounded.
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries.filter(|n| *n > 0);
        self
    }

    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts.max(1);
        self
    }
}

#[derive(Debug)]
struct MaskedUrlEntry {
    original_url: String,
    display_name: String,
    created_at: Instant,
    created_at_utc: DateTime<Utc>,
    expires_at: Instant,
    access_count: u64,
    last_accessed_at: Option<Instant>,
    last_accessed_utc: Option<DateTime<Utc>>,
}

impl MaskedUrlEntry {
    fn is_expired(&self, now: Instant) -> bool {
        clock::is_expired(self.expires_at, now)
    }

    /// Never-resolved entries count as used at creation time.
    fn recency(&self) -> Instant {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    fn view(&self, id: &str, now: Instant, now_utc: DateTime<Utc>) -> MaskedUrlView {
        MaskedUrlView {
            masked_id: id.to_string(),
            display_name: self.display_name.clone(),
            created_at: self.created_at_utc,
            expires_at: clock::to_utc(self.expires_at, now, now_utc),
            time_to_expire_secs: self.expires_at.saturating_duration_since(now).as_secs(),
            access_count: self.access_count,
            last_accessed_at: self.last_accessed_utc,
        }
    }
}

struct MaskingInner {
    entries: Mutex<HashMap<String, MaskedUrlEntry>>,
    clock: SharedClock,
    config: MaskingConfig,
    ids: Arc<dyn IdSource>,
}

impl MaskingInner {
    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    fn make_room(&self, entries: &mut HashMap<String, MaskedUrlEntry>, now: Instant) {
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
                .min_by_key(|(_, entry)| entry.recency())
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            entries.remove(&victim);
            debug!(masked_id = %victim, "Evicted least recently used masked URL");
        }
    }
}

impl Sweep for MaskingInner {
    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

/// UUID-style URL masking with access accounting.
pub struct MaskingProxy {
    inner: Arc<MaskingInner>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl MaskingProxy {
    pub fn new(config: MaskingConfig, clock: SharedClock) -> Self {
        Self::with_id_source(config, clock, Arc::new(RandomIdSource))
    }

    pub fn with_id_source(
        config: MaskingConfig,
        clock: SharedClock,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            inner: Arc::new(MaskingInner {
                entries: Mutex::new(HashMap::new()),
                clock,
                config,
                ids,
            }),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MaskingConfig {
        &self.inner.config
    }

    /// Register `original_url` and return the opaque id that stands in for it.
    ///
    /// `ttl` falls back to the configured default. An id that collides with
    /// any present entry is regenerated; running out of attempts means the
    /// randomness source is broken and surfaces as [`Error::Internal`].
    pub fn create_masked_url(
        &self,
        original_url: &str,
        display_name: &str,
        ttl: Option<Duration>,
    ) -> Result<String> {
        if original_url.trim().is_empty() {
            return Err(Error::InvalidInput("original URL must not be empty".to_string()));
        }

        let ttl = ttl.unwrap_or(self.inner.config.default_ttl);
        if ttl.is_zero() {
            return Err(Error::InvalidTtl);
        }

        let display_name = match display_name.trim() {
            "" => DEFAULT_DISPLAY_NAME,
            name => name,
        };

        let now = self.inner.clock.now();
        let now_utc = self.inner.clock.now_utc();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| Error::InvalidInput(format!("ttl {:?} is out of range", ttl)))?;

        let mut entries = self.inner.entries.lock();

        let mut unique_id = None;
        for attempt in 1..=self.inner.config.max_id_attempts {
            let id = self.inner.ids.generate();
            if !entries.contains_key(&id) {
                unique_id = Some(id);
                break;
            }
            warn!(attempt, "Generated masked id collides with a stored entry");
        }

        let Some(id) = unique_id else {
            return Err(Error::Internal(format!(
                "could not generate a unique masked id in {} attempts",
                self.inner.config.max_id_attempts
            )));
        };

        // Evict only once the insert is certain to happen
        self.inner.make_room(&mut entries, now);
        entries.insert(
            id.clone(),
            MaskedUrlEntry {
                original_url: original_url.to_string(),
                display_name: display_name.to_string(),
                created_at: now,
                created_at_utc: now_utc,
                expires_at,
                access_count: 0,
                last_accessed_at: None,
                last_accessed_utc: None,
            },
        );
        debug!(masked_id = %id, original_url, "Created masked URL");
        Ok(id)
    }

    /// Exchange an id for its upstream URL, counting the access.
    pub fn resolve(&self, id: &str) -> Option<String> {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();

        match entries.get_mut(id) {
            None => {
                debug!(masked_id = id, "Masked URL not found");
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                entry.access_count += 1;
                entry.last_accessed_at = Some(now);
                entry.last_accessed_utc = Some(self.inner.clock.now_utc());
                debug!(masked_id = id, access_count = entry.access_count, "Proxy access");
                return Some(entry.original_url.clone());
            }
            Some(_) => {}
        }

        entries.remove(id);
        debug!(masked_id = id, "Masked URL expired");
        None
    }

    /// Inspect an entry without counting an access.
    pub fn describe(&self, id: &str) -> Option<MaskedUrlView> {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();

        match entries.get(id) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => {
                return Some(entry.view(id, now, self.inner.clock.now_utc()));
            }
            Some(_) => {}
        }

        entries.remove(id);
        None
    }

    /// Remove an entry immediately, regardless of its remaining lifetime.
    pub fn revoke(&self, id: &str) -> bool {
        let revoked = self.inner.entries.lock().remove(id).is_some();
        if revoked {
            debug!(masked_id = id, "Revoked masked URL");
        }
        revoked
    }

    /// Push back the deadline of a live entry. An expired entry is purged and
    /// cannot be revived.
    pub fn extend_ttl(&self, id: &str, extra: Duration) -> bool {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();

        match entries.get_mut(id) {
            None => return false,
            Some(entry) if !entry.is_expired(now) => {
                let Some(extended) = entry.expires_at.checked_add(extra) else {
                    return false;
                };
                entry.expires_at = extended;
                debug!(masked_id = id, extra_secs = extra.as_secs(), "Extended masked URL TTL");
                return true;
            }
            Some(_) => {}
        }

        entries.remove(id);
        false
    }

    pub fn stats(&self) -> ProxyStats {
        let now = self.inner.clock.now();
        let entries = self.inner.entries.lock();

        let expired = entries.values().filter(|entry| entry.is_expired(now)).count();
        let total_accesses = entries.values().map(|entry| entry.access_count).sum();

        ProxyStats::new(entries.len(), expired, total_accesses)
    }

    /// Live entries, newest first, at most `limit` of them.
    pub fn list_active(&self, limit: usize) -> Vec<MaskedUrlView> {
        let now = self.inner.clock.now();
        let now_utc = self.inner.clock.now_utc();
        let entries = self.inner.entries.lock();

        let mut active: Vec<(Instant, MaskedUrlView)> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(id, entry)| (entry.created_at, entry.view(id, now, now_utc)))
            .collect();
        drop(entries);

        active.sort_by(|a, b| b.0.cmp(&a.0));
        active.into_iter().take(limit).map(|(_, view)| view).collect()
    }

    /// Physical entry count, including expired entries not yet swept.
    pub fn size(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    pub fn start_sweeper(&self) -> Result<()> {
        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_some_and(Sweeper::is_running) {
            return Ok(());
        }

        *slot = Some(Sweeper::spawn(
            "masking",
            Arc::downgrade(&self.inner),
            self.inner.config.sweep_interval,
        )?);
        Ok(())
    }

    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
    }
}

impl std::fmt::Debug for MaskingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskingProxy")
            .field("entry_count", &self.inner.entries.lock().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Public redirect path for a masked id. The label is reduced to
/// path-safe ASCII.
pub fn masked_path(id: &str, display_name: &str) -> String {
    let label: String = display_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let label = if label.is_empty() {
        DEFAULT_DISPLAY_NAME.to_string()
    } else {
        label
    };

    format!("/api/proxy/{}/{}", id, label)
}
