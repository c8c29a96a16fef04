pub mod cache;
pub mod health;
pub mod processing;
pub mod proxy;
pub mod stats;

pub use cache::clear_cache;
pub use health::health_check;
pub use processing::{cleanup_processing, processing_status};
pub use proxy::{
    create_masked_url, extend_masked_url, list_masked_urls, proxy_download, revoke_masked_url,
};
pub use stats::get_stats;
