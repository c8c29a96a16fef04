use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize, // physical count, may include unswept expired entries
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64, // percent, 0.0 when there were no lookups
    pub evictions: u64,
}

impl CacheStats {
    pub fn new(size: usize, hits: u64, misses: u64, evictions: u64) -> Self {
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            (hits as f64 / lookups as f64) * 100.0
        };

        Self {
            size,
            hits,
            misses,
            hit_rate,
            evictions,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProxyStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub total_accesses: u64,
    pub average_accesses: f64,
}

impl ProxyStats {
    pub fn new(total: usize, expired: usize, total_accesses: u64) -> Self {
        Self {
            total,
            active: total - expired,
            expired,
            total_accesses,
            average_accesses: total_accesses as f64 / total.max(1) as f64,
        }
    }
}

/// Operator-facing view of a masked URL. Deliberately omits the upstream URL.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MaskedUrlView {
    pub masked_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub time_to_expire_secs: u64,
    pub access_count: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Composite key of a processing record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingKey {
    pub resource_id: String,
    pub variant: String,
}

impl ProcessingKey {
    pub fn new(resource_id: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            variant: variant.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.resource_id.is_empty() && !self.variant.is_empty()
    }
}

impl std::fmt::Display for ProcessingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.resource_id, self.variant)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processing,
}

/// Persisted marker that work for `(resource_id, variant)` is underway.
/// Absence of a record means "not processing".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub resource_id: String,
    pub variant: String,
    pub status: ProcessingStatus,
    pub started_at: DateTime<Utc>,
}

impl ProcessingRecord {
    pub fn processing(key: &ProcessingKey, started_at: DateTime<Utc>) -> Self {
        Self {
            resource_id: key.resource_id.clone(),
            variant: key.variant.clone(),
            status: ProcessingStatus::Processing,
            started_at,
        }
    }

    pub fn key(&self) -> ProcessingKey {
        ProcessingKey::new(self.resource_id.clone(), self.variant.clone())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StateStats {
    pub uptime_secs: u64,
    pub cache: CacheStats,
    pub masking: ProxyStats,
    pub processing_active: Option<usize>, // None when the store is unreachable
}
