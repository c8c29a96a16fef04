#![deny(clippy::all)]

pub mod cache;
pub mod clock;
pub mod domain;
pub mod masking;
pub mod ports;
pub mod processing;
pub mod stats;
pub mod sweeper;

// Re-export commonly used types
pub use cache::{CacheConfig, TtlCache};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use domain::{
    CacheStats, MaskedUrlView, ProcessingKey, ProcessingRecord, ProcessingStatus, ProxyStats,
    StateStats,
};
pub use masking::{masked_path, IdSource, MaskingConfig, MaskingProxy, RandomIdSource};
pub use ports::ProcessingStore;
pub use processing::{MemoryProcessingStore, ProcessingTracker, TrackerConfig};
pub use stats::StatsAggregator;
pub use sweeper::{Sweep, Sweeper};
