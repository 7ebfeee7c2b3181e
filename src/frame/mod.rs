//! WebSocket frame layout: opcodes, header parsing and encoding, masking,
//! and close payloads.
//!
//! The reader consults [`FrameHeader::parse`] once at least two bytes of a
//! frame are buffered; the header is only constructed when every byte it
//! needs is present, so a partial header simply yields `Ok(None)`.

pub mod close;
pub mod header;
pub mod mask;

pub use close::{encode_close_payload, parse_close_payload};
pub use header::{FrameHeader, HeaderRules, MAX_CONTROL_PAYLOAD, OpCode};
pub use mask::apply_mask;
