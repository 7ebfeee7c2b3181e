//! Random correlation identifiers for outgoing calls.

use crate::rng::RandomSource;

/// Number of characters in a generated call identifier.
pub const CALL_ID_LEN: usize = 8;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Draw a fresh identifier from the URL-safe base64 alphabet.
///
/// Identifiers are drawn independently; uniqueness against in-flight calls
/// is enforced by the pending-call table.
#[must_use]
pub fn new_call_id(random: &dyn RandomSource) -> String {
    let mut bytes = [0u8; CALL_ID_LEN];
    random.fill(&mut bytes);
    bytes
        .iter()
        .map(|b| char::from(ALPHABET[usize::from(b & 0x3f)]))
        .collect()
}
