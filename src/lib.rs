#![doc(html_root_url = "https://docs.rs/wampframe/latest")]
//! Public API for the `wampframe` library.
//!
//! This crate provides a client-side WebSocket implementation (framing,
//! handshake, connection tasks) and a JSON RPC and publish/subscribe session
//! layer that runs over it.

pub mod codec;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod metrics;
pub mod options;
pub mod panic;
pub mod rng;
pub mod utf8;
pub mod wamp;

pub use codec::{CodecError, EncodeError, ProtocolViolation, WebSocketCodec};
pub use connection::{
    CloseReason,
    ConnectionStatus,
    WebSocketConnection,
    WebSocketConnectionBuilder,
    WebSocketHandler,
    WebSocketSender,
};
pub use error::{ConnectError, SendError};
pub use handshake::{UriError, WsUri};
pub use message::{CloseCode, Message};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, FRAMES_PROCESSED};
pub use options::{Options, OptionsError};
pub use wamp::{CallError, SessionHandler, WampError, WampSession};
