//! Canonical error types for opening and using a connection.

use std::io;

use thiserror::Error;

use crate::{codec::EncodeError, handshake::UriError};

/// Failure to open a connection.
///
/// The handler's `on_close` also receives
/// [`CloseReason::CannotConnect`](crate::CloseReason::CannotConnect) with the
/// error's message.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The URI was rejected.
    #[error("invalid WebSocket URI: {0}")]
    Uri(#[from] UriError),

    /// The TCP connection could not be established.
    #[error("failed to connect to {authority}: {source}")]
    Tcp {
        /// `host:port` that was dialled.
        authority: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The TCP connection did not complete in time.
    #[error("connecting to {authority} timed out")]
    Timeout {
        /// `host:port` that was dialled.
        authority: String,
    },
}

/// Failure to queue an outgoing message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The opening handshake has not completed yet.
    #[error("opening handshake still in progress")]
    NotOpen,

    /// The connection has been torn down.
    #[error("connection is not open")]
    NotConnected,

    /// A close frame was already sent.
    #[error("connection is closing")]
    Closing,

    /// Raw text that is not UTF-8.
    #[error("raw text payload is not valid UTF-8")]
    InvalidUtf8,

    /// The message cannot be framed.
    #[error("invalid message: {0}")]
    Invalid(#[from] EncodeError),
}
