use crate::shortcode::ShortCode;

/// Trait for deriving short codes from URLs.
///
/// Implementations must be pure: the same URL bytes always yield the same
/// code, across calls and across process restarts. This is what lets the
/// storage layer detect "already shortened" after an insert fails instead of
/// checking before it.
///
/// Implementations are not required to be collision free.
pub trait ShortCodeCalculator: Send + Sync + 'static {
    /// Calculates the short code for the given URL.
    fn calculate(&self, url: &str) -> ShortCode;
}

/// Calculates short codes as the CRC-32 (IEEE) checksum of the URL bytes,
/// rendered as 8 lowercase hex digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Calculator;

impl Crc32Calculator {
    pub fn new() -> Self {
        Self
    }
}

impl ShortCodeCalculator for Crc32Calculator {
    fn calculate(&self, url: &str) -> ShortCode {
        let checksum = crc32fast::hash(url.as_bytes());
        ShortCode::new_unchecked(format!("{:08x}", checksum))
    }
}
