//! Close frame payloads: a big-endian status code followed by a UTF-8
//! reason.

use bytes::{BufMut, BytesMut};

use super::header::MAX_CONTROL_PAYLOAD;
use crate::{
    codec::{EncodeError, ProtocolViolation},
    message::CloseCode,
};

/// Split a received close payload into its code and reason.
///
/// An empty payload carries neither. A single byte is rejected by header
/// validation before this is reached.
///
/// # Errors
///
/// Returns [`ProtocolViolation::InvalidCloseCode`] for codes that may not
/// appear on the wire and [`ProtocolViolation::InvalidCloseReason`] when the
/// reason is not UTF-8.
pub fn parse_close_payload(
    payload: &[u8],
) -> Result<(Option<CloseCode>, Option<String>), ProtocolViolation> {
    let [high, low, reason @ ..] = payload else {
        return Ok((None, None));
    };
    let code = CloseCode::from(u16::from_be_bytes([*high, *low]));
    if !code.is_valid() {
        return Err(ProtocolViolation::InvalidCloseCode {
            code: code.as_u16(),
        });
    }
    if reason.is_empty() {
        return Ok((Some(code), None));
    }
    let reason = std::str::from_utf8(reason).map_err(|_| ProtocolViolation::InvalidCloseReason)?;
    Ok((Some(code), Some(reason.to_owned())))
}

/// Append an outgoing close payload to `dst`.
///
/// # Errors
///
/// Returns an [`EncodeError`] when a reason is given without a code, the code
/// may not be sent, or the payload would exceed the control frame limit.
pub fn encode_close_payload(
    code: Option<CloseCode>,
    reason: Option<&str>,
    dst: &mut BytesMut,
) -> Result<(), EncodeError> {
    let Some(code) = code else {
        return match reason {
            Some(_) => Err(EncodeError::CloseReasonWithoutCode),
            None => Ok(()),
        };
    };
    if !code.is_valid() {
        return Err(EncodeError::InvalidCloseCode {
            code: code.as_u16(),
        });
    }
    let reason = reason.unwrap_or_default();
    let len = 2 + reason.len();
    if len > MAX_CONTROL_PAYLOAD {
        return Err(EncodeError::ControlPayloadTooLarge { len });
    }
    dst.put_u16(code.as_u16());
    dst.put_slice(reason.as_bytes());
    Ok(())
}
