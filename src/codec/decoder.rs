//! Incoming byte stream to [`Message`] decoding.
//!
//! [`WebSocketDecoder`] first waits for the server's handshake response,
//! then parses frames, answers control frames as messages of their own, and
//! reassembles fragmented data messages while validating UTF-8 as bytes
//! arrive.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use super::error::{CodecError, ProtocolViolation};
use crate::{
    frame::{FrameHeader, HeaderRules, OpCode, parse_close_payload},
    handshake,
    message::Message,
    metrics,
    options::Options,
    utf8::Utf8Validator,
};

/// Reader lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    /// Waiting for the handshake response.
    Connecting,
    /// Exchanging frames.
    Open,
    /// A close frame was received. Later bytes are ignored.
    Closing,
    /// A violation ended decoding.
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DataKind {
    Text,
    Binary,
}

#[derive(Debug)]
struct MessageAssembly {
    kind: DataKind,
    payload: BytesMut,
}

/// Decoder for the server side of a WebSocket connection.
#[derive(Debug)]
pub struct WebSocketDecoder {
    options: Options,
    state: ReadyState,
    header: Option<FrameHeader>,
    assembly: Option<MessageAssembly>,
    validator: Utf8Validator,
}

impl WebSocketDecoder {
    /// Decoder that expects the handshake response first.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            options,
            state: ReadyState::Connecting,
            header: None,
            assembly: None,
            validator: Utf8Validator::new(),
        }
    }

    /// Decoder that starts directly with frames.
    #[must_use]
    pub fn without_handshake(options: Options) -> Self {
        Self {
            state: ReadyState::Open,
            ..Self::new(options)
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ReadyState { self.state }

    /// Whether a fragmented message is being reassembled.
    #[must_use]
    pub const fn inside_message(&self) -> bool { self.assembly.is_some() }

    fn decode_handshake(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolViolation> {
        let Some(len) = handshake::parse_response(src)? else {
            return Ok(None);
        };
        src.advance(len);
        self.state = ReadyState::Open;
        tracing::debug!(len, leftover = src.len(), "handshake response accepted");
        Ok(Some(Message::ServerHandshakeAccepted))
    }

    fn decode_frames(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolViolation> {
        loop {
            let header = match self.header {
                Some(header) => header,
                None => {
                    let rules = HeaderRules {
                        max_frame_payload: self.options.max_frame_payload_size(),
                        inside_message: self.inside_message(),
                    };
                    let Some(header) = FrameHeader::parse(src, rules)? else {
                        return Ok(None);
                    };
                    self.header = Some(header);
                    header
                }
            };

            if src.len() < header.frame_len() {
                src.reserve(header.frame_len() - src.len());
                return Ok(None);
            }
            self.header = None;
            src.advance(header.header_len());
            let payload = src.split_to(header.payload_len());
            metrics::inc_frames(metrics::Direction::Inbound);
            tracing::trace!(
                opcode = %header.opcode(),
                fin = header.fin(),
                len = header.payload_len(),
                "frame received"
            );

            if let Some(message) = self.process_frame(header, payload)? {
                return Ok(Some(message));
            }
        }
    }

    fn process_frame(
        &mut self,
        header: FrameHeader,
        payload: BytesMut,
    ) -> Result<Option<Message>, ProtocolViolation> {
        match header.opcode() {
            OpCode::Close => {
                let (code, reason) = parse_close_payload(&payload)?;
                self.state = ReadyState::Closing;
                Ok(Some(Message::Close { code, reason }))
            }
            OpCode::Ping => Ok(Some(Message::Ping(payload.freeze()))),
            OpCode::Pong => Ok(Some(Message::Pong(payload.freeze()))),
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                self.accumulate(header, payload)
            }
        }
    }

    fn accumulate(
        &mut self,
        header: FrameHeader,
        payload: BytesMut,
    ) -> Result<Option<Message>, ProtocolViolation> {
        let mut assembly = match header.opcode() {
            OpCode::Continuation => self
                .assembly
                .take()
                .ok_or(ProtocolViolation::UnexpectedContinuation)?,
            opcode => {
                let kind = if opcode == OpCode::Text {
                    self.validator.reset();
                    DataKind::Text
                } else {
                    DataKind::Binary
                };
                MessageAssembly {
                    kind,
                    payload: BytesMut::new(),
                }
            }
        };

        let len = assembly.payload.len() + payload.len();
        let max = self.options.max_message_payload_size();
        if len > max {
            return Err(ProtocolViolation::MessageTooLarge { len, max });
        }
        let validate = assembly.kind == DataKind::Text && self.options.validate_incoming_utf8();
        if validate && !self.validator.validate(&payload) {
            return Err(ProtocolViolation::InvalidUtf8 {
                position: self.validator.position(),
            });
        }
        if assembly.payload.is_empty() {
            assembly.payload = payload;
        } else {
            assembly.payload.extend_from_slice(&payload);
        }

        if !header.fin() {
            self.assembly = Some(assembly);
            return Ok(None);
        }

        let MessageAssembly { kind, payload } = assembly;
        match kind {
            DataKind::Binary => Ok(Some(Message::Binary(payload.freeze()))),
            DataKind::Text => {
                if validate && !self.validator.is_valid() {
                    return Err(ProtocolViolation::IncompleteUtf8);
                }
                if self.options.receive_text_as_raw() {
                    return Ok(Some(Message::RawText(payload.freeze())));
                }
                String::from_utf8(Vec::from(payload))
                    .map(|text| Some(Message::Text(text)))
                    .map_err(|e| ProtocolViolation::InvalidUtf8 {
                        position: e.utf8_error().valid_up_to(),
                    })
            }
        }
    }
}

impl Decoder for WebSocketDecoder {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let result = match self.state {
            ReadyState::Connecting => self.decode_handshake(src),
            ReadyState::Open => self.decode_frames(src),
            ReadyState::Closing | ReadyState::Closed => {
                src.clear();
                return Ok(None);
            }
        };
        result.map_err(|violation| {
            self.state = ReadyState::Closed;
            self.assembly = None;
            self.header = None;
            metrics::inc_violations();
            CodecError::Violation(violation)
        })
    }
}
