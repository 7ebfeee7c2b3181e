//! Errors raised by the session layer.

use thiserror::Error;

use crate::error::SendError;

/// Failure to send an envelope.
#[derive(Debug, Error)]
pub enum WampError {
    /// The envelope could not be queued on the connection.
    #[error("failed to send envelope: {0}")]
    Send(#[from] SendError),

    /// An argument or event could not be encoded as JSON.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of a call that did not produce a result.
#[derive(Debug, Error)]
pub enum CallError {
    /// The peer answered with a call error envelope.
    #[error("remote error {error_uri}: {error_desc}")]
    Remote {
        /// URI identifying the error.
        error_uri: String,
        /// Human-readable description.
        error_desc: String,
    },

    /// The result did not match the expected type.
    #[error("failed to decode call result: {0}")]
    Decode(#[source] serde_json::Error),

    /// The connection closed before the peer answered.
    #[error("connection closed before the call completed")]
    ConnectionClosed,

    /// The call was never sent.
    #[error(transparent)]
    NotSent(#[from] WampError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_names_uri_and_description() {
        let err = CallError::Remote {
            error_uri: "http://example.com/error#invalid".into(),
            error_desc: "argument must be positive".into(),
        };
        assert_eq!(
            err.to_string(),
            "remote error http://example.com/error#invalid: argument must be positive"
        );
    }

    #[test]
    fn not_sent_is_transparent() {
        let err = CallError::from(WampError::from(SendError::NotConnected));
        assert_eq!(err.to_string(), "failed to send envelope: connection is not open");
    }
}
