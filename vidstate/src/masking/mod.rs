pub mod id;
pub mod proxy;

pub use id::{IdSource, RandomIdSource};
pub use proxy::{masked_path, MaskingConfig, MaskingProxy};
