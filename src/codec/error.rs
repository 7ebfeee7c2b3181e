//! Error types for the codec layer.
//!
//! - [`ProtocolViolation`]: the peer broke a framing, UTF-8, or handshake rule. Always fatal to the
//!   connection.
//! - [`EncodeError`]: an outgoing message cannot be framed.
//! - [`CodecError`]: top-level enum wrapping both plus transport I/O errors.
//!
//! [`CodecError`] converts into [`std::io::Error`] with kind
//! [`io::ErrorKind::InvalidData`] so it can travel through I/O-typed
//! interfaces, and [`CodecError::from_io`] recovers the typed error on the
//! other side.

use std::io;

use thiserror::Error;

use crate::{frame::OpCode, message::CloseCode};

/// A rule broken by the peer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Reserved header bits were set without a negotiated extension.
    #[error("reserved bits set in frame header: {bits:#05b}")]
    ReservedBits {
        /// The three reserved bits.
        bits: u8,
    },

    /// Opcode outside the defined data and control set.
    #[error("unknown opcode {opcode:#x}")]
    UnknownOpcode {
        /// Rejected opcode.
        opcode: u8,
    },

    /// Server frames must not be masked.
    #[error("server frame is masked")]
    MaskedServerFrame,

    /// Control frames must not be fragmented.
    #[error("{opcode} frame is fragmented")]
    FragmentedControlFrame {
        /// Offending opcode.
        opcode: OpCode,
    },

    /// Control frame payloads are limited to 125 bytes.
    #[error("control frame payload exceeds 125 bytes")]
    ControlPayloadTooLarge,

    /// A one-byte payload on a close or pong frame.
    #[error("{opcode} frame has a one byte payload")]
    InvalidControlPayloadLength {
        /// Offending opcode.
        opcode: OpCode,
    },

    /// Continuation frame with no fragmented message in progress.
    #[error("continuation frame outside a fragmented message")]
    UnexpectedContinuation,

    /// New data frame while a fragmented message is in progress.
    #[error("{opcode} frame inside a fragmented message")]
    ExpectedContinuation {
        /// Offending opcode.
        opcode: OpCode,
    },

    /// Extended payload length that fits a shorter encoding.
    #[error("payload length {len} is not minimally encoded")]
    NonMinimalLength {
        /// Declared length.
        len: u64,
    },

    /// 64-bit payload length with the most significant bit set.
    #[error("64-bit payload length has the most significant bit set")]
    LengthHighBitSet,

    /// Frame payload above the configured ceiling.
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Declared payload length.
        len: u64,
        /// Ceiling in force.
        max: usize,
    },

    /// Reassembled message above the configured ceiling.
    #[error("message payload of {len} bytes exceeds limit of {max}")]
    MessageTooLarge {
        /// Accumulated length including the rejected frame.
        len: usize,
        /// Ceiling in force.
        max: usize,
    },

    /// Text payload contains an invalid UTF-8 sequence.
    #[error("invalid UTF-8 in text message at byte {position}")]
    InvalidUtf8 {
        /// Message offset of the first invalid byte.
        position: usize,
    },

    /// Text message ended inside a multi-byte sequence.
    #[error("text message ends inside a UTF-8 sequence")]
    IncompleteUtf8,

    /// Close code that may not appear on the wire.
    #[error("invalid close code {code}")]
    InvalidCloseCode {
        /// Received code.
        code: u16,
    },

    /// Close reason is not UTF-8.
    #[error("close reason is not valid UTF-8")]
    InvalidCloseReason,

    /// Server answered the handshake with something other than 101.
    #[error("server rejected handshake: {status_line}")]
    HandshakeRejected {
        /// Status code and reason from the response.
        status_line: String,
    },

    /// Handshake response could not be parsed.
    #[error("malformed handshake response: {detail}")]
    MalformedHandshake {
        /// Parser diagnostic.
        detail: String,
    },

    /// Handshake response headers exceed the buffer limit.
    #[error("handshake response exceeds {max} bytes")]
    HandshakeTooLarge {
        /// Limit in force.
        max: usize,
    },
}

impl ProtocolViolation {
    /// Close code to send back to the peer.
    ///
    /// ```
    /// use wampframe::{CloseCode, codec::ProtocolViolation};
    ///
    /// assert_eq!(
    ///     ProtocolViolation::IncompleteUtf8.close_code(),
    ///     CloseCode::INVALID_PAYLOAD
    /// );
    /// assert_eq!(
    ///     ProtocolViolation::MaskedServerFrame.close_code(),
    ///     CloseCode::PROTOCOL_ERROR
    /// );
    /// ```
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::InvalidUtf8 { .. } | Self::IncompleteUtf8 | Self::InvalidCloseReason => {
                CloseCode::INVALID_PAYLOAD
            }
            Self::FrameTooLarge { .. } | Self::MessageTooLarge { .. } => CloseCode::MESSAGE_TOO_BIG,
            _ => CloseCode::PROTOCOL_ERROR,
        }
    }

    /// Whether the violation happened during the opening handshake.
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Self::HandshakeRejected { .. }
                | Self::MalformedHandshake { .. }
                | Self::HandshakeTooLarge { .. }
        )
    }
}

/// An outgoing message that cannot be framed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// Control frame payload above 125 bytes.
    #[error("control frame payload of {len} bytes exceeds 125")]
    ControlPayloadTooLarge {
        /// Payload length that was requested.
        len: usize,
    },

    /// Close code that may not be sent.
    #[error("close code {code} may not be sent")]
    InvalidCloseCode {
        /// Rejected code.
        code: u16,
    },

    /// A close reason requires a close code.
    #[error("close reason supplied without a close code")]
    CloseReasonWithoutCode,

    /// The message is an event, not wire data.
    #[error("{kind} messages cannot be encoded")]
    UnsupportedMessage {
        /// Variant name of the message.
        kind: &'static str,
    },
}

/// Top-level codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer broke a protocol rule.
    #[error("protocol violation: {0}")]
    Violation(#[from] ProtocolViolation),

    /// An outgoing message could not be framed.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Recover a typed codec error from an I/O error produced by
    /// `From<CodecError> for io::Error`.
    ///
    /// ```
    /// use std::io;
    ///
    /// use wampframe::codec::{CodecError, ProtocolViolation};
    ///
    /// let io_err: io::Error = CodecError::from(ProtocolViolation::MaskedServerFrame).into();
    /// assert!(matches!(
    ///     CodecError::from_io(io_err),
    ///     CodecError::Violation(ProtocolViolation::MaskedServerFrame)
    /// ));
    /// ```
    #[must_use]
    pub fn from_io(err: io::Error) -> Self {
        if err.kind() != io::ErrorKind::InvalidData
            || !err.get_ref().is_some_and(|inner| inner.is::<Self>())
        {
            return Self::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Self>()) {
            Some(Ok(codec)) => *codec,
            Some(Err(inner)) => Self::Io(io::Error::new(io::ErrorKind::InvalidData, inner)),
            None => Self::Io(io::Error::from(io::ErrorKind::InvalidData)),
        }
    }

    /// The violation carried by this error, if any.
    #[must_use]
    pub fn violation(&self) -> Option<&ProtocolViolation> {
        match self {
            Self::Violation(violation) => Some(violation),
            _ => None,
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
