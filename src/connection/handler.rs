//! Application callbacks for a WebSocket connection.

use std::fmt;

use bytes::Bytes;

use super::WebSocketSender;

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Closed by either side through the close handshake or a local
    /// disconnect.
    Normal,
    /// The connection never opened: bad URI, TCP failure, or a rejected
    /// handshake.
    CannotConnect,
    /// The transport ended or failed while open.
    ConnectionLost,
    /// The peer broke a protocol rule.
    ProtocolError,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Normal => "normal",
            Self::CannotConnect => "cannot connect",
            Self::ConnectionLost => "connection lost",
            Self::ProtocolError => "protocol error",
        };
        f.write_str(text)
    }
}

/// Callbacks invoked on the connection's dispatcher task.
///
/// Every method has an empty default. Callbacks run one at a time and in the
/// order their messages were reassembled. A panic inside a callback is
/// logged and does not end the connection.
///
/// `on_close` is called exactly once per connection attempt, including
/// attempts that fail before any frame is exchanged.
///
/// # Examples
///
/// ```
/// use wampframe::{CloseReason, WebSocketHandler, WebSocketSender};
///
/// struct Echo(Option<WebSocketSender>);
///
/// impl WebSocketHandler for Echo {
///     fn on_open(&mut self, sender: &WebSocketSender) { self.0 = Some(sender.clone()); }
///
///     fn on_text_message(&mut self, text: String) {
///         if let Some(sender) = &self.0 {
///             let _ = sender.send_text(text);
///         }
///     }
///
///     fn on_close(&mut self, reason: CloseReason, detail: &str) {
///         eprintln!("closed: {reason} ({detail})");
///     }
/// }
/// ```
pub trait WebSocketHandler: Send + 'static {
    /// The server accepted the handshake.
    fn on_open(&mut self, _sender: &WebSocketSender) {}

    /// The connection ended.
    fn on_close(&mut self, _reason: CloseReason, _detail: &str) {}

    /// A text message arrived and raw text delivery is off.
    fn on_text_message(&mut self, _text: String) {}

    /// A text message arrived and raw text delivery is on.
    fn on_raw_text_message(&mut self, _payload: Bytes) {}

    /// A binary message arrived.
    fn on_binary_message(&mut self, _payload: Bytes) {}

    /// A pong arrived.
    fn on_pong(&mut self, _payload: Bytes) {}
}

impl WebSocketHandler for () {}
