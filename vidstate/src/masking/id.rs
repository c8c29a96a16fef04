use rand::Rng;
use uuid::Uuid;

/// Source of opaque masked-URL identifiers.
pub trait IdSource: Send + Sync + 'static {
    fn generate(&self) -> String;
}

/// 128 bits from the thread-local CSPRNG, rendered as 32 lowercase hex chars.
///
/// All 128 bits are random; a v4 UUID would fix 6 of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdSource;

impl IdSource for RandomIdSource {
    fn generate(&self) -> String {
        let bytes: [u8; 16] = rand::rng().random();
        Uuid::from_bytes(bytes).simple().to_string()
    }
}
