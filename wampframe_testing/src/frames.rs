//! Builders for raw frame bytes.
//!
//! These bypass the encoder so tests can produce frames the encoder would
//! refuse to emit: masked server frames, reserved bits, non-minimal lengths.

use wampframe::frame::apply_mask;

pub const OP_CONTINUATION: u8 = 0x0;
pub const OP_TEXT: u8 = 0x1;
pub const OP_BINARY: u8 = 0x2;
pub const OP_CLOSE: u8 = 0x8;
pub const OP_PING: u8 = 0x9;
pub const OP_PONG: u8 = 0xA;

/// Append the minimal length encoding of `len` with the mask bit set as
/// requested.
pub fn encode_length(len: usize, masked: bool, out: &mut Vec<u8>) {
    let mask_bit = if masked { 0x80 } else { 0 };
    match len {
        0..=125 => out.push(mask_bit | len as u8),
        126..=0xFFFF => {
            out.push(mask_bit | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            out.push(mask_bit | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }
}

/// An unmasked frame as a server would send it.
///
/// ```
/// use wampframe_testing::{OP_TEXT, server_frame};
///
/// assert_eq!(server_frame(OP_TEXT, true, b"hi"), b"\x81\x02hi");
/// ```
pub fn server_frame(opcode: u8, fin: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.push(if fin { 0x80 } else { 0 } | opcode);
    encode_length(payload.len(), false, &mut out);
    out.extend_from_slice(payload);
    out
}

/// A frame masked with `key`, as a client would send it.
pub fn masked_frame(opcode: u8, fin: bool, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(if fin { 0x80 } else { 0 } | opcode);
    encode_length(payload.len(), true, &mut out);
    out.extend_from_slice(&key);
    let start = out.len();
    out.extend_from_slice(payload);
    apply_mask(&mut out[start..], key);
    out
}

/// Close frame payload: big-endian code followed by the reason.
pub fn close_payload(code: u16, reason: &str) -> Vec<u8> {
    let mut out = code.to_be_bytes().to_vec();
    out.extend_from_slice(reason.as_bytes());
    out
}

/// Minimal `101 Switching Protocols` response.
pub const SWITCHING_PROTOCOLS: &str = "HTTP/1.1 101 Switching Protocols\r\nUpgrade: \
                                       websocket\r\nConnection: Upgrade\r\n\r\n";
