//! Dispatcher task: routes reader and writer events to the handler and owns
//! teardown.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Notify, mpsc, watch},
    task::JoinHandle,
    time::{Instant, sleep_until, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CloseReason, ConnectionStatus, WebSocketHandler, WebSocketSender};
use crate::{
    codec::ProtocolViolation,
    message::Message,
    metrics,
    panic::guard_callback,
};

/// Time allowed for the writer to flush queued frames during teardown.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct Dispatcher<H> {
    pub(crate) handler: H,
    pub(crate) sender: WebSocketSender,
    pub(crate) events: mpsc::UnboundedReceiver<Message>,
    pub(crate) status: watch::Sender<ConnectionStatus>,
    pub(crate) reader: JoinHandle<()>,
    pub(crate) writer: JoinHandle<()>,
    pub(crate) reader_quit: CancellationToken,
    pub(crate) peer: String,
    pub(crate) close_started: Arc<Notify>,
    pub(crate) open_handshake_timeout: Option<Duration>,
    pub(crate) close_handshake_timeout: Option<Duration>,
}

impl<H: WebSocketHandler> Dispatcher<H> {
    pub(crate) async fn run(mut self) {
        let mut open_deadline = self.open_handshake_timeout.map(|limit| Instant::now() + limit);
        let mut close_deadline = None;
        let (reason, detail) = loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        break (self.lost_reason(), "event queue closed".to_owned());
                    };
                    if matches!(event, Message::ServerHandshakeAccepted) {
                        open_deadline = None;
                    }
                    if let Some(outcome) = self.handle(event) {
                        break outcome;
                    }
                }
                () = self.close_started.notified(), if close_deadline.is_none() => {
                    close_deadline = Some(
                        self.close_handshake_timeout
                            .map(|limit| Instant::now() + limit),
                    );
                }
                () = expire(close_deadline.flatten().or(open_deadline)) => {
                    break self.handshake_timed_out(close_deadline.flatten().is_some());
                }
            }
        };
        self.teardown(reason, &detail).await;
    }

    fn handshake_timed_out(&self, closing: bool) -> (CloseReason, String) {
        if closing {
            warn!(peer = %self.peer, "peer did not answer close frame in time");
            (CloseReason::Normal, "close handshake timed out".to_owned())
        } else {
            warn!(peer = %self.peer, "server did not accept handshake in time");
            (CloseReason::CannotConnect, "opening handshake timed out".to_owned())
        }
    }

    fn is_open(&self) -> bool { *self.status.borrow() == ConnectionStatus::Open }

    fn lost_reason(&self) -> CloseReason {
        if !self.is_open() {
            CloseReason::CannotConnect
        } else if self.sender.close_sent() {
            CloseReason::Normal
        } else {
            CloseReason::ConnectionLost
        }
    }

    /// Handle one event. `Some` ends the connection.
    fn handle(&mut self, event: Message) -> Option<(CloseReason, String)> {
        match event {
            Message::ServerHandshakeAccepted => {
                self.status.send_replace(ConnectionStatus::Open);
                info!(peer = %self.peer, "websocket connection open");
                let sender = &self.sender;
                let handler = &mut self.handler;
                guard_callback("on_open", || handler.on_open(sender));
                None
            }
            Message::Text(text) => {
                self.deliver("on_text_message", "text", |h| h.on_text_message(text));
                None
            }
            Message::RawText(payload) => {
                self.deliver("on_raw_text_message", "raw_text", |h| {
                    h.on_raw_text_message(payload);
                });
                None
            }
            Message::Binary(payload) => {
                self.deliver("on_binary_message", "binary", |h| h.on_binary_message(payload));
                None
            }
            Message::Pong(payload) => {
                self.deliver("on_pong", "pong", |h| h.on_pong(payload));
                None
            }
            Message::Ping(payload) => {
                debug!(len = payload.len(), "answering ping");
                self.sender.enqueue_internal(Message::Pong(payload));
                None
            }
            Message::Close { code, reason } => {
                if !self.sender.mark_close_sent() {
                    self.sender
                        .enqueue_internal(Message::Close { code, reason: None });
                }
                let detail = match (code, reason) {
                    (Some(code), Some(reason)) => format!("peer closed with {code}: {reason}"),
                    (Some(code), None) => format!("peer closed with {code}"),
                    (None, _) => "peer closed without status".to_owned(),
                };
                Some((CloseReason::Normal, detail))
            }
            Message::ConnectionLost => Some((self.lost_reason(), "connection lost".to_owned())),
            Message::TransportError(detail) => {
                warn!(peer = %self.peer, error = %detail, "transport failure");
                Some((self.lost_reason(), detail))
            }
            Message::ProtocolViolation(violation) => Some(self.violation(&violation)),
            Message::Quit => Some((CloseReason::Normal, "disconnected".to_owned())),
            Message::ClientHandshake(_) => {
                debug!("ignoring client handshake event");
                None
            }
        }
    }

    fn deliver(&mut self, callback: &'static str, kind: &'static str, f: impl FnOnce(&mut H)) {
        metrics::inc_messages(kind);
        let handler = &mut self.handler;
        guard_callback(callback, || f(handler));
    }

    fn violation(&self, violation: &ProtocolViolation) -> (CloseReason, String) {
        warn!(peer = %self.peer, %violation, "protocol violation");
        if violation.is_handshake() {
            return (CloseReason::CannotConnect, violation.to_string());
        }
        if !self.sender.mark_close_sent() {
            self.sender
                .enqueue_internal(Message::close(violation.close_code(), None));
        }
        (CloseReason::ProtocolError, violation.to_string())
    }

    async fn teardown(self, reason: CloseReason, detail: &str) {
        let Self {
            mut handler,
            sender,
            status,
            reader,
            writer,
            reader_quit,
            peer,
            ..
        } = self;

        reader_quit.cancel();
        if let Err(e) = reader.await {
            warn!(error = %e, "reader task failed");
        }

        sender.enqueue_internal(Message::Quit);
        let abort = writer.abort_handle();
        match timeout(WRITER_DRAIN_TIMEOUT, writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "writer task failed"),
            Err(_) => {
                warn!("writer did not drain in time; aborting");
                abort.abort();
            }
        }

        status.send_replace(ConnectionStatus::Closed);
        metrics::dec_connections();
        info!(peer = %peer, %reason, detail, "websocket connection closed");
        guard_callback("on_close", || handler.on_close(reason, detail));
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
