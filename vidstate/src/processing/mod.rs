pub mod memory_store;
pub mod tracker;

pub use memory_store::MemoryProcessingStore;
pub use tracker::{ProcessingTracker, TrackerConfig};
