use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of shipment tracking codes for order shops and return items
pub trait TrackingCodeGenerator: Send + Sync {
    /// A fixed-length uppercase alphanumeric code
    fn next_code(&self) -> String;
}

/// Random codes for production use
pub struct RandomTrackingCodes {
    length: usize,
}

impl RandomTrackingCodes {
    pub fn new(length: usize) -> Self {
        Self { length: length.max(1) }
    }
}

impl TrackingCodeGenerator for RandomTrackingCodes {
    fn next_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Predictable codes (`TRK0000001`, `TRK0000002`, ...) for tests
pub struct SequentialTrackingCodes {
    prefix: String,
    length: usize,
    counter: AtomicU64,
}

impl SequentialTrackingCodes {
    pub fn new(prefix: &str, length: usize) -> Self {
        Self {
            prefix: prefix.to_ascii_uppercase(),
            length,
            counter: AtomicU64::new(0),
        }
    }
}

impl TrackingCodeGenerator for SequentialTrackingCodes {
    fn next_code(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let width = self.length.saturating_sub(self.prefix.len());
        format!("{}{:0>width$}", self.prefix, n, width = width)
    }
}
