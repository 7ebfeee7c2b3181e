//! Frame header parsing and encoding.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::codec::ProtocolViolation;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const FIN_BIT: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0f;
const MASK_BIT: u8 = 0x80;
const LEN_MASK: u8 = 0x7f;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Frame opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Continues a fragmented message.
    Continuation,
    /// First frame of a text message.
    Text,
    /// First frame of a binary message.
    Binary,
    /// Close control frame.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
}

impl OpCode {
    /// Wire value of the opcode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0,
            Self::Text => 1,
            Self::Binary => 2,
            Self::Close => 8,
            Self::Ping => 9,
            Self::Pong => 10,
        }
    }

    /// Whether this is a close, ping, or pong opcode.
    #[must_use]
    pub const fn is_control(self) -> bool { self.as_u8() & 0x08 != 0 }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolViolation;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Continuation),
            1 => Ok(Self::Text),
            2 => Ok(Self::Binary),
            8 => Ok(Self::Close),
            9 => Ok(Self::Ping),
            10 => Ok(Self::Pong),
            opcode => Err(ProtocolViolation::UnknownOpcode { opcode }),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(name)
    }
}

/// Reader context needed to validate an incoming header.
#[derive(Clone, Copy, Debug)]
pub struct HeaderRules {
    /// Largest payload accepted for one frame.
    pub max_frame_payload: usize,
    /// Whether a fragmented message is in progress.
    pub inside_message: bool,
}

/// Parsed or to-be-written frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    opcode: OpCode,
    fin: bool,
    mask: Option<[u8; 4]>,
    payload_len: usize,
    header_len: usize,
}

impl FrameHeader {
    /// Header for an outgoing frame.
    #[must_use]
    pub const fn new(opcode: OpCode, fin: bool, payload_len: usize, mask: Option<[u8; 4]>) -> Self {
        Self {
            opcode,
            fin,
            mask,
            payload_len,
            header_len: encoded_len(payload_len, mask.is_some()),
        }
    }

    /// Frame opcode.
    #[must_use]
    pub const fn opcode(&self) -> OpCode { self.opcode }

    /// Whether this frame ends its message.
    #[must_use]
    pub const fn fin(&self) -> bool { self.fin }

    /// Masking key, present only on client frames.
    #[must_use]
    pub const fn mask(&self) -> Option<[u8; 4]> { self.mask }

    /// Number of payload bytes following the header.
    #[must_use]
    pub const fn payload_len(&self) -> usize { self.payload_len }

    /// Number of header bytes, including any extended length and mask.
    #[must_use]
    pub const fn header_len(&self) -> usize { self.header_len }

    /// Header plus payload length.
    #[must_use]
    pub const fn frame_len(&self) -> usize { self.header_len + self.payload_len }

    /// Parse a server frame header from the front of `src`.
    ///
    /// Returns `Ok(None)` until every header byte is buffered. The payload
    /// need not be present.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] when the header breaks a framing rule
    /// or declares a payload above `rules.max_frame_payload`.
    pub fn parse(src: &[u8], rules: HeaderRules) -> Result<Option<Self>, ProtocolViolation> {
        let [first, second, ..] = *src else {
            return Ok(None);
        };

        let rsv = first & RSV_MASK;
        if rsv != 0 {
            return Err(ProtocolViolation::ReservedBits { bits: rsv >> 4 });
        }
        let opcode = OpCode::try_from(first & OPCODE_MASK)?;
        let fin = first & FIN_BIT != 0;
        if second & MASK_BIT != 0 {
            return Err(ProtocolViolation::MaskedServerFrame);
        }
        let short_len = second & LEN_MASK;

        if opcode.is_control() {
            if !fin {
                return Err(ProtocolViolation::FragmentedControlFrame { opcode });
            }
            if usize::from(short_len) > MAX_CONTROL_PAYLOAD {
                return Err(ProtocolViolation::ControlPayloadTooLarge);
            }
            if short_len == 1 && matches!(opcode, OpCode::Close | OpCode::Pong) {
                return Err(ProtocolViolation::InvalidControlPayloadLength { opcode });
            }
        } else if opcode == OpCode::Continuation {
            if !rules.inside_message {
                return Err(ProtocolViolation::UnexpectedContinuation);
            }
        } else if rules.inside_message {
            return Err(ProtocolViolation::ExpectedContinuation { opcode });
        }

        let (declared, header_len) = match short_len {
            LEN_16 => {
                let Some(ext) = src.get(2..4) else {
                    return Ok(None);
                };
                let len = u16::from_be_bytes([ext[0], ext[1]]);
                if len < u16::from(LEN_16) {
                    return Err(ProtocolViolation::NonMinimalLength { len: u64::from(len) });
                }
                (u64::from(len), 4)
            }
            LEN_64 => {
                let Some(ext) = src.get(2..10) else {
                    return Ok(None);
                };
                let mut raw = [0_u8; 8];
                raw.copy_from_slice(ext);
                let len = u64::from_be_bytes(raw);
                if len >> 63 != 0 {
                    return Err(ProtocolViolation::LengthHighBitSet);
                }
                if len <= u64::from(u16::MAX) {
                    return Err(ProtocolViolation::NonMinimalLength { len });
                }
                (len, 10)
            }
            len => (u64::from(len), 2),
        };

        let payload_len = usize::try_from(declared)
            .ok()
            .filter(|len| *len <= rules.max_frame_payload)
            .ok_or(ProtocolViolation::FrameTooLarge {
                len: declared,
                max: rules.max_frame_payload,
            })?;

        Ok(Some(Self {
            opcode,
            fin,
            mask: None,
            payload_len,
            header_len,
        }))
    }

    /// Append the header bytes to `dst`.
    ///
    /// Lengths below 126 are written inline, lengths up to `u16::MAX` use the
    /// 16-bit extension, and anything larger uses the 64-bit extension. The
    /// masking key follows the length when present.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.frame_len());
        let fin = if self.fin { FIN_BIT } else { 0 };
        dst.put_u8(fin | self.opcode.as_u8());
        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };
        match (u8::try_from(self.payload_len), u16::try_from(self.payload_len)) {
            (Ok(short), _) if short < LEN_16 => dst.put_u8(mask_bit | short),
            (_, Ok(medium)) => {
                dst.put_u8(mask_bit | LEN_16);
                dst.put_u16(medium);
            }
            _ => {
                dst.put_u8(mask_bit | LEN_64);
                dst.put_u64(self.payload_len as u64);
            }
        }
        if let Some(key) = self.mask {
            dst.put_slice(&key);
        }
    }
}

const fn encoded_len(payload_len: usize, masked: bool) -> usize {
    let base = if payload_len < LEN_16 as usize {
        2
    } else if payload_len <= u16::MAX as usize {
        4
    } else {
        10
    };
    if masked { base + 4 } else { base }
}
