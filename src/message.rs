//! Messages exchanged between the frame reader, the frame writer, and the
//! connection dispatcher.
//!
//! [`Message`] carries both wire-level content (text, binary, control
//! frames, the opening handshake) and connection events raised by the I/O
//! tasks (`ConnectionLost`, `ProtocolViolation`, `TransportError`, `Quit`).

use std::fmt;

use bytes::Bytes;

use crate::{codec::ProtocolViolation, handshake::ClientHandshakeRequest};

/// Status code carried by a close frame.
///
/// ```
/// use wampframe::CloseCode;
///
/// assert!(CloseCode::NORMAL.is_valid());
/// assert!(CloseCode::from(3000).is_valid());
/// assert!(!CloseCode::from(1005).is_valid());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: Self = Self(1000);
    /// Endpoint is going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// Protocol error.
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Unsupported data type.
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    /// Payload inconsistent with the message type, such as invalid UTF-8.
    pub const INVALID_PAYLOAD: Self = Self(1007);
    /// Generic policy violation.
    pub const POLICY_VIOLATION: Self = Self(1008);
    /// Message too large to process.
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    /// Client expected an extension the server did not negotiate.
    pub const MANDATORY_EXTENSION: Self = Self(1010);
    /// Server hit an unexpected condition.
    pub const INTERNAL_ERROR: Self = Self(1011);

    /// Numeric value of the code.
    #[must_use]
    pub const fn as_u16(self) -> u16 { self.0 }

    /// Whether the code may appear on the wire.
    ///
    /// Codes below 1000, the reserved 1004 to 1006 and 1015, unassigned
    /// codes in the 1016 to 2999 range, and anything from 5000 upwards are
    /// invalid.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self.0, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self { Self(value) }
}

impl From<CloseCode> for u16 {
    fn from(value: CloseCode) -> Self { value.0 }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// A unit of work passed between connection tasks.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Opening handshake to send to the server.
    ClientHandshake(ClientHandshakeRequest),
    /// The server accepted the opening handshake.
    ServerHandshakeAccepted,
    /// Complete text message decoded to a `String`.
    Text(String),
    /// Complete text message left as bytes.
    RawText(Bytes),
    /// Complete binary message.
    Binary(Bytes),
    /// Ping control frame.
    Ping(Bytes),
    /// Pong control frame.
    Pong(Bytes),
    /// Close control frame.
    Close {
        /// Status code, absent for an empty close payload.
        code: Option<CloseCode>,
        /// UTF-8 reason following the code.
        reason: Option<String>,
    },
    /// The transport reached end of stream.
    ConnectionLost,
    /// The peer broke a protocol rule.
    ProtocolViolation(ProtocolViolation),
    /// The transport failed.
    TransportError(String),
    /// Stop the writer task.
    Quit,
}

impl Message {
    /// Short name of the variant for logs and errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ClientHandshake(_) => "client_handshake",
            Self::ServerHandshakeAccepted => "server_handshake_accepted",
            Self::Text(_) => "text",
            Self::RawText(_) => "raw_text",
            Self::Binary(_) => "binary",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Close { .. } => "close",
            Self::ConnectionLost => "connection_lost",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::TransportError(_) => "transport_error",
            Self::Quit => "quit",
        }
    }

    /// Close frame with a code and optional reason.
    #[must_use]
    pub fn close(code: CloseCode, reason: Option<String>) -> Self {
        Self::Close {
            code: Some(code),
            reason,
        }
    }
}
