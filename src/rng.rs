//! Random source handle used for masking keys, handshake keys, and call ids.
//!
//! Components that need randomness receive a [`SharedRandom`] rather than
//! reaching for a global generator, so tests can substitute a seeded or
//! scripted source.

use std::sync::{Arc, Mutex, PoisonError};

use base64::prelude::*;
use rand::{RngCore, SeedableRng, rngs::StdRng};

/// Source of random bytes.
pub trait RandomSource: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill(&self, dest: &mut [u8]);
}

/// Shared handle to a random source.
pub type SharedRandom = Arc<dyn RandomSource>;

/// Operating-system seeded thread-local generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn fill(&self, dest: &mut [u8]) { rand::rng().fill_bytes(dest); }
}

/// Deterministic generator for reproducible tests.
///
/// ```
/// use wampframe::rng::{RandomSource, SeededRandom};
///
/// let a = SeededRandom::new(7);
/// let b = SeededRandom::new(7);
/// let (mut x, mut y) = ([0_u8; 8], [0_u8; 8]);
/// a.fill(&mut x);
/// b.fill(&mut y);
/// assert_eq!(x, y);
/// ```
#[derive(Debug)]
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
    /// Create a generator from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self { Self(Mutex::new(StdRng::seed_from_u64(seed))) }
}

impl RandomSource for SeededRandom {
    fn fill(&self, dest: &mut [u8]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(dest);
    }
}

/// Default shared source backed by [`ThreadRandom`].
#[must_use]
pub fn thread_random() -> SharedRandom { Arc::new(ThreadRandom) }

/// Draw a fresh 4-byte frame masking key.
#[must_use]
pub fn mask_key(random: &dyn RandomSource) -> [u8; 4] {
    let mut key = [0_u8; 4];
    random.fill(&mut key);
    key
}

/// Draw a `Sec-WebSocket-Key` value: 16 random bytes, base64 encoded.
#[must_use]
pub fn handshake_key(random: &dyn RandomSource) -> String {
    let mut nonce = [0_u8; 16];
    random.fill(&mut nonce);
    BASE64_STANDARD.encode(nonce)
}

#[cfg(test)]
mod tests {
    use base64::prelude::*;

    use super::{SeededRandom, ThreadRandom, handshake_key, mask_key};

    #[test]
    fn handshake_key_encodes_sixteen_bytes() {
        let key = handshake_key(&ThreadRandom);
        assert_eq!(key.len(), 24);
        let decoded = BASE64_STANDARD.decode(key).expect("valid base64");
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn seeded_source_yields_distinct_successive_masks() {
        let random = SeededRandom::new(42);
        let masks: Vec<[u8; 4]> = (0..8).map(|_| mask_key(&random)).collect();
        assert!(masks.windows(2).any(|pair| pair[0] != pair[1]));
    }
}
