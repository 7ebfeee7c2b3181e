//! Drive a decoder over chunked input.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use wampframe::{
    CodecError,
    Message,
    Options,
    codec::{WebSocketCodec, WebSocketDecoder},
};

/// Feed `chunks` to `decoder` one at a time, collecting every message.
///
/// Stops at the first error.
pub fn decode_stream<'a, I>(
    decoder: &mut WebSocketDecoder,
    chunks: I,
) -> Result<Vec<Message>, CodecError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(message) = decoder.decode(&mut buf)? {
            out.push(message);
        }
    }
    Ok(out)
}

/// Decode `bytes` as frames following an accepted handshake, `chunk` bytes
/// at a time.
pub fn decode_frames(
    options: Options,
    bytes: &[u8],
    chunk: usize,
) -> Result<Vec<Message>, CodecError> {
    let mut decoder = WebSocketCodec::new(options).frame_decoder();
    decode_stream(&mut decoder, bytes.chunks(chunk.max(1)))
}
