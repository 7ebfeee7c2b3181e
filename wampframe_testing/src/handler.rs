//! A [`WebSocketHandler`] that records every callback.

use std::time::Duration;

use bytes::Bytes;
use rstest::fixture;
use tokio::{sync::mpsc, time::timeout};
use wampframe::{CloseReason, WebSocketHandler, WebSocketSender};

/// Upper bound on how long [`Events::next`] waits.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// One recorded callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Open,
    Text(String),
    RawText(Bytes),
    Binary(Bytes),
    Pong(Bytes),
    Close(CloseReason, String),
}

/// Forwards each callback to an [`Events`] receiver.
#[derive(Debug)]
pub struct RecordingHandler {
    events: mpsc::UnboundedSender<Event>,
    echo: bool,
    sender: Option<WebSocketSender>,
}

impl RecordingHandler {
    /// Create a handler and the receiver for its events.
    pub fn new() -> (Self, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: tx,
                echo: false,
                sender: None,
            },
            Events(rx),
        )
    }

    /// Also echo every text and binary message back to the peer.
    #[must_use]
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    fn record(&self, event: Event) { let _ = self.events.send(event); }
}

impl WebSocketHandler for RecordingHandler {
    fn on_open(&mut self, sender: &WebSocketSender) {
        self.sender = Some(sender.clone());
        self.record(Event::Open);
    }

    fn on_close(&mut self, reason: CloseReason, detail: &str) {
        self.record(Event::Close(reason, detail.to_owned()));
    }

    fn on_text_message(&mut self, text: String) {
        if self.echo
            && let Some(sender) = &self.sender
        {
            let _ = sender.send_text(text.clone());
        }
        self.record(Event::Text(text));
    }

    fn on_raw_text_message(&mut self, payload: Bytes) {
        if self.echo
            && let Some(sender) = &self.sender
        {
            let _ = sender.send_raw_text(payload.clone());
        }
        self.record(Event::RawText(payload));
    }

    fn on_binary_message(&mut self, payload: Bytes) {
        if self.echo
            && let Some(sender) = &self.sender
        {
            let _ = sender.send_binary(payload.clone());
        }
        self.record(Event::Binary(payload));
    }

    fn on_pong(&mut self, payload: Bytes) { self.record(Event::Pong(payload)); }
}

/// Receiver for a [`RecordingHandler`]'s events.
#[derive(Debug)]
pub struct Events(mpsc::UnboundedReceiver<Event>);

impl Events {
    /// Next event, or `None` if none arrives within [`EVENT_TIMEOUT`] or the
    /// handler was dropped.
    pub async fn next(&mut self) -> Option<Event> {
        timeout(EVENT_TIMEOUT, self.0.recv()).await.ok().flatten()
    }

    /// Wait for the close event and return its reason and detail.
    ///
    /// # Panics
    ///
    /// Panics if the handler is dropped or times out first.
    pub async fn expect_close(&mut self) -> (CloseReason, String) {
        loop {
            match self.next().await {
                Some(Event::Close(reason, detail)) => return (reason, detail),
                Some(_) => {}
                None => panic!("connection did not close"),
            }
        }
    }

    /// Events already queued, without waiting.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.0.try_recv() {
            out.push(event);
        }
        out
    }
}

/// A fresh recording handler and its event receiver.
#[fixture]
pub fn recording() -> (RecordingHandler, Events) { RecordingHandler::new() }
