//! Incremental UTF-8 validation with constant memory.
//!
//! [`Utf8Validator`] runs a deterministic finite automaton over each byte of
//! a stream. Every byte is first mapped to one of twelve structural classes
//! (ASCII, the three continuation ranges, and the lead bytes with their
//! overlong and surrogate exclusions), then the class and the current state
//! select the next state. Multi-byte code points may straddle chunk
//! boundaries because the automaton state survives between calls to
//! [`Utf8Validator::validate`].

const ACCEPT: u8 = 0;
const REJECT: u8 = 1;

/// Byte class for each possible input octet.
#[rustfmt::skip]
const BYTE_CLASS: [u8; 256] = [
    // 0x00..=0x7f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    // 0x80..=0x8f, 0x90..=0x9f
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9,
    // 0xa0..=0xbf
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    // 0xc0..=0xc1 are always overlong, 0xc2..=0xdf
    8, 8, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    // 0xe0, 0xe1..=0xec, 0xed (surrogate lead), 0xee..=0xef
    10, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 3, 3,
    // 0xf0, 0xf1..=0xf3, 0xf4, 0xf5..=0xff
    11, 6, 6, 6, 5, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
];

/// Transition table indexed by `state * 16 + class`.
#[rustfmt::skip]
const TRANSITIONS: [u8; 144] = [
    0, 1, 2, 3, 5, 8, 7, 1, 1, 1, 4, 6, 1, 1, 1, 1, // accept
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // reject
    1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 1, 1, 1, 1, 1, 1, // one continuation left
    1, 2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1, 1, // two continuations left
    1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 1, // after 0xe0: 0xa0..=0xbf
    1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, // after 0xed: 0x80..=0x9f
    1, 1, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, 1, 1, 1, 1, // after 0xf0: 0x90..=0xbf
    1, 3, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, 1, 1, 1, 1, // after 0xf1..=0xf3
    1, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // after 0xf4: 0x80..=0x8f
];

/// Streaming UTF-8 validator.
///
/// # Examples
///
/// ```
/// use wampframe::utf8::Utf8Validator;
///
/// let mut validator = Utf8Validator::new();
/// let euro = "€".as_bytes();
/// assert!(validator.validate(&euro[..1]));
/// assert!(!validator.is_valid());
/// assert!(validator.validate(&euro[1..]));
/// assert!(validator.is_valid());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Utf8Validator {
    state: u8,
    position: usize,
}

impl Utf8Validator {
    /// Create a validator ready for a new stream.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ACCEPT,
            position: 0,
        }
    }

    /// Forget all state so the validator can check a new stream.
    pub fn reset(&mut self) { *self = Self::new(); }

    /// Feed the next chunk of the stream.
    ///
    /// Returns `false` as soon as an invalid sequence is found. Once that has
    /// happened every later call also returns `false` until [`reset`] is
    /// called.
    ///
    /// [`reset`]: Self::reset
    pub fn validate(&mut self, bytes: &[u8]) -> bool {
        if self.state == REJECT {
            return false;
        }
        for (offset, &byte) in bytes.iter().enumerate() {
            let class = BYTE_CLASS[usize::from(byte)];
            self.state = TRANSITIONS[usize::from(self.state) * 16 + usize::from(class)];
            if self.state == REJECT {
                self.position += offset;
                return false;
            }
        }
        self.position += bytes.len();
        true
    }

    /// Whether the bytes seen so far end on a complete code point.
    #[must_use]
    pub const fn is_valid(&self) -> bool { self.state == ACCEPT }

    /// Whether an invalid sequence has been seen.
    #[must_use]
    pub const fn is_rejected(&self) -> bool { self.state == REJECT }

    /// Number of bytes consumed, or the stream offset of the first invalid
    /// byte once validation has failed.
    #[must_use]
    pub const fn position(&self) -> usize { self.position }
}

/// Validate a complete buffer in one call.
///
/// Returns `true` only when every byte is valid and the buffer ends on a code
/// point boundary.
#[must_use]
pub fn is_complete_utf8(bytes: &[u8]) -> bool {
    let mut validator = Utf8Validator::new();
    validator.validate(bytes) && validator.is_valid()
}
