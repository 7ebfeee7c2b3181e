//! [`Message`] to wire bytes encoding for the client side of a connection.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use super::error::{CodecError, EncodeError};
use crate::{
    frame::{FrameHeader, MAX_CONTROL_PAYLOAD, OpCode, apply_mask, encode_close_payload},
    message::Message,
    metrics,
    rng::{SharedRandom, handshake_key, mask_key},
};

/// Encoder for client frames and the opening handshake.
///
/// Every frame gets a fresh masking key from the random source unless
/// masking is disabled.
#[derive(Clone)]
pub struct WebSocketEncoder {
    mask: bool,
    random: SharedRandom,
}

impl std::fmt::Debug for WebSocketEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketEncoder")
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}

impl WebSocketEncoder {
    /// Encoder drawing keys from `random`.
    #[must_use]
    pub fn new(mask: bool, random: SharedRandom) -> Self { Self { mask, random } }

    fn write_frame(&self, opcode: OpCode, payload: &[u8], dst: &mut BytesMut) {
        let key = self.mask.then(|| mask_key(self.random.as_ref()));
        FrameHeader::new(opcode, true, payload.len(), key).encode(dst);
        let start = dst.len();
        dst.put_slice(payload);
        if let Some(key) = key {
            apply_mask(&mut dst[start..], key);
        }
        metrics::inc_frames(metrics::Direction::Outbound);
    }

    fn write_control(&self, opcode: OpCode, payload: &[u8], dst: &mut BytesMut) -> Result<(), EncodeError> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(EncodeError::ControlPayloadTooLarge { len: payload.len() });
        }
        self.write_frame(opcode, payload, dst);
        Ok(())
    }
}

impl Encoder<Message> for WebSocketEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::ClientHandshake(request) => {
                let key = handshake_key(self.random.as_ref());
                dst.put_slice(request.render(&key).as_bytes());
            }
            Message::Text(text) => self.write_frame(OpCode::Text, text.as_bytes(), dst),
            Message::RawText(bytes) => self.write_frame(OpCode::Text, &bytes, dst),
            Message::Binary(bytes) => self.write_frame(OpCode::Binary, &bytes, dst),
            Message::Ping(bytes) => self.write_control(OpCode::Ping, &bytes, dst)?,
            Message::Pong(bytes) => self.write_control(OpCode::Pong, &bytes, dst)?,
            Message::Close { code, reason } => {
                let mut payload = BytesMut::with_capacity(MAX_CONTROL_PAYLOAD);
                encode_close_payload(code, reason.as_deref(), &mut payload)?;
                self.write_control(OpCode::Close, &payload, dst)?;
            }
            other => {
                return Err(EncodeError::UnsupportedMessage { kind: other.kind() }.into());
            }
        }
        Ok(())
    }
}
