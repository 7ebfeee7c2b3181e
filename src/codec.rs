//! WebSocket codec for the client side of a connection.
//!
//! [`WebSocketCodec`] holds the options snapshot and random source for one
//! connection and hands out a [`WebSocketDecoder`] for the read half and a
//! [`WebSocketEncoder`] for the write half. Both plug into
//! `tokio_util::codec` and exchange [`crate::Message`] values.
//!
//! # Error Handling
//!
//! Decoding fails with [`CodecError::Violation`] whenever the peer breaks a
//! framing, UTF-8, or handshake rule. Violations are never recoverable: the
//! decoder moves to [`ReadyState::Closed`] and ignores further input. See the
//! [`error`] module for the full taxonomy.

use std::fmt;

use crate::{
    options::Options,
    rng::{SharedRandom, thread_random},
};

pub mod decoder;
pub mod encoder;
pub mod error;

pub use decoder::{ReadyState, WebSocketDecoder};
pub use encoder::WebSocketEncoder;
pub use error::{CodecError, EncodeError, ProtocolViolation};

/// Factory for a connection's decoder and encoder.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::{Decoder, Encoder};
/// use wampframe::{Message, Options, codec::WebSocketCodec};
///
/// let mut options = Options::default();
/// options.set_mask_outgoing_frames(false);
/// let codec = WebSocketCodec::new(options);
///
/// let mut buf = BytesMut::new();
/// codec
///     .encoder()
///     .encode(Message::Text("hi".into()), &mut buf)
///     .unwrap();
/// assert_eq!(&buf[..], b"\x81\x02hi");
///
/// let decoded = codec.frame_decoder().decode(&mut buf).unwrap();
/// assert_eq!(decoded, Some(Message::Text("hi".into())));
/// ```
#[derive(Clone)]
pub struct WebSocketCodec {
    options: Options,
    random: SharedRandom,
}

impl fmt::Debug for WebSocketCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketCodec")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl WebSocketCodec {
    /// Codec with the thread-local random source.
    #[must_use]
    pub fn new(options: Options) -> Self { Self::with_random(options, thread_random()) }

    /// Codec drawing masks and handshake keys from `random`.
    #[must_use]
    pub fn with_random(options: Options, random: SharedRandom) -> Self { Self { options, random } }

    /// Options in force for this codec.
    #[must_use]
    pub fn options(&self) -> &Options { &self.options }

    /// Decoder expecting the handshake response before any frame.
    #[must_use]
    pub fn decoder(&self) -> WebSocketDecoder { WebSocketDecoder::new(self.options.clone()) }

    /// Decoder for a stream that is already past the handshake.
    #[must_use]
    pub fn frame_decoder(&self) -> WebSocketDecoder {
        WebSocketDecoder::without_handshake(self.options.clone())
    }

    /// Encoder for outgoing frames.
    #[must_use]
    pub fn encoder(&self) -> WebSocketEncoder {
        WebSocketEncoder::new(self.options.mask_outgoing_frames(), self.random.clone())
    }
}
