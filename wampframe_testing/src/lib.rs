//! Test utilities for `wampframe`.
//!
//! - [`frames`] builds raw frame bytes, including ones the encoder refuses to
//!   produce.
//! - [`codec`] feeds byte chunks through a decoder.
//! - [`server`] runs a scripted loopback server that speaks the handshake and
//!   exchanges raw frames with the client under test.
//! - [`handler`] records connection callbacks for assertions.
//!
//! ```rust,no_run
//! use wampframe::WebSocketConnection;
//! use wampframe_testing::{Event, OP_TEXT, RecordingHandler, ScriptedServer};
//!
//! # async fn demo() -> std::io::Result<()> {
//! let server = ScriptedServer::bind().await?;
//! let (handler, mut events) = RecordingHandler::new();
//! let connection = WebSocketConnection::connect(&server.url("/"), handler)
//!     .await
//!     .expect("connect");
//! let mut peer = server.accept().await?;
//! peer.send_frame(OP_TEXT, true, b"hello").await?;
//! assert_eq!(events.next().await, Some(Event::Open));
//! assert_eq!(events.next().await, Some(Event::Text("hello".into())));
//! # drop(connection);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod frames;
pub mod handler;
pub mod server;

pub use codec::{decode_frames, decode_stream};
pub use frames::{
    OP_BINARY,
    OP_CLOSE,
    OP_CONTINUATION,
    OP_PING,
    OP_PONG,
    OP_TEXT,
    SWITCHING_PROTOCOLS,
    close_payload,
    encode_length,
    masked_frame,
    server_frame,
};
pub use handler::{EVENT_TIMEOUT, Event, Events, RecordingHandler, recording};
pub use server::{ClientFrame, ClientRequest, READ_TIMEOUT, ScriptedServer, ServerConnection};
