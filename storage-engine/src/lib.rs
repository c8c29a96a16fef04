// Adapters implementing the vidstate ports

pub mod sled_processing_store;

pub use sled_processing_store::SledProcessingStore;
