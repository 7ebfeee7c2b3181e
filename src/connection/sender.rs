//! Cloneable handle for queueing outgoing messages.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::{Bytes, BytesMut};
use tokio::sync::{Notify, mpsc, watch};

use super::ConnectionStatus;
use crate::{
    codec::EncodeError,
    error::SendError,
    frame::{MAX_CONTROL_PAYLOAD, encode_close_payload},
    message::{CloseCode, Message},
    utf8::is_complete_utf8,
};

/// Queues messages for the connection's writer task.
///
/// Messages are written in the order they are queued. Queueing never waits
/// for the peer.
#[derive(Clone, Debug)]
pub struct WebSocketSender {
    outgoing: mpsc::UnboundedSender<Message>,
    events: mpsc::UnboundedSender<Message>,
    status: watch::Receiver<ConnectionStatus>,
    close_sent: Arc<AtomicBool>,
    close_started: Arc<Notify>,
}

impl WebSocketSender {
    pub(crate) fn new(
        outgoing: mpsc::UnboundedSender<Message>,
        events: mpsc::UnboundedSender<Message>,
        status: watch::Receiver<ConnectionStatus>,
        close_started: Arc<Notify>,
    ) -> Self {
        Self {
            outgoing,
            events,
            status,
            close_sent: Arc::new(AtomicBool::new(false)),
            close_started,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus { *self.status.borrow() }

    /// Whether the handshake completed and the connection has not closed.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.status() == ConnectionStatus::Open }

    /// Wait for the opening handshake to finish.
    ///
    /// Resolves to `true` once the connection is open and `false` if it
    /// closed without opening.
    pub async fn opened(&self) -> bool {
        let mut status = self.status.clone();
        status
            .wait_for(|status| *status != ConnectionStatus::Connecting)
            .await
            .is_ok_and(|status| *status == ConnectionStatus::Open)
    }

    /// Queue a text message.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotOpen`] before the server accepts the
    /// handshake, [`SendError::NotConnected`] after teardown and
    /// [`SendError::Closing`] once a close frame has been sent.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.enqueue(Message::Text(text.into()))
    }

    /// Queue a text message whose payload is already UTF-8 encoded.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidUtf8`] when `payload` is not UTF-8, plus
    /// the errors of [`send_text`](Self::send_text).
    pub fn send_raw_text(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        let payload = payload.into();
        if !is_complete_utf8(&payload) {
            return Err(SendError::InvalidUtf8);
        }
        self.enqueue(Message::RawText(payload))
    }

    /// Queue a binary message.
    ///
    /// # Errors
    ///
    /// See [`send_text`](Self::send_text).
    pub fn send_binary(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        self.enqueue(Message::Binary(payload.into()))
    }

    /// Queue a ping.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Invalid`] for payloads above 125 bytes, plus the
    /// errors of [`send_text`](Self::send_text).
    pub fn send_ping(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        let payload = payload.into();
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(EncodeError::ControlPayloadTooLarge {
                len: payload.len(),
            }
            .into());
        }
        self.enqueue(Message::Ping(payload))
    }

    /// Start the close handshake.
    ///
    /// The connection is torn down with
    /// [`CloseReason::Normal`](super::CloseReason::Normal) once the server
    /// answers with its own close frame, drops the transport, or lets
    /// [`Options::close_handshake_timeout`](crate::Options::close_handshake_timeout)
    /// elapse.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Invalid`] for codes that may not be sent or a
    /// reason that does not fit a control frame, plus the errors of
    /// [`send_text`](Self::send_text).
    pub fn close(&self, code: CloseCode, reason: Option<&str>) -> Result<(), SendError> {
        encode_close_payload(Some(code), reason, &mut BytesMut::new())?;
        self.enqueue(Message::close(code, reason.map(str::to_owned)))?;
        self.close_sent.store(true, Ordering::Release);
        self.close_started.notify_one();
        Ok(())
    }

    /// Tear the connection down without a close handshake.
    ///
    /// Has no effect once the connection is already closed.
    pub fn disconnect(&self) {
        if self.events.send(Message::Quit).is_err() {
            tracing::debug!("disconnect requested after teardown");
        }
    }

    pub(crate) fn close_sent(&self) -> bool { self.close_sent.load(Ordering::Acquire) }

    /// Mark the close handshake as started. Returns the previous state.
    pub(crate) fn mark_close_sent(&self) -> bool { self.close_sent.swap(true, Ordering::AcqRel) }

    /// Queue a message generated by the connection itself.
    pub(crate) fn enqueue_internal(&self, message: Message) {
        if self.outgoing.send(message).is_err() {
            tracing::debug!("writer already stopped; dropping internal message");
        }
    }

    fn enqueue(&self, message: Message) -> Result<(), SendError> {
        match self.status() {
            ConnectionStatus::Connecting => return Err(SendError::NotOpen),
            ConnectionStatus::Closed => return Err(SendError::NotConnected),
            ConnectionStatus::Open => {}
        }
        if self.close_sent() {
            return Err(SendError::Closing);
        }
        self.outgoing
            .send(message)
            .map_err(|_| SendError::NotConnected)
    }
}
