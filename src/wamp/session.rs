//! RPC and publish/subscribe session over a WebSocket connection.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    envelope::WampEnvelope,
    error::{CallError, WampError},
    pending::PendingCalls,
};
use crate::{
    connection::{CloseReason, WebSocketConnection, WebSocketConnectionBuilder, WebSocketHandler, WebSocketSender},
    error::ConnectError,
    message::CloseCode,
    options::Options,
    panic::guard_callback,
    rng::{SharedRandom, thread_random},
};

/// Subprotocol offered during the handshake.
pub const WAMP_SUBPROTOCOL: &str = "wamp";

type EventFn = Box<dyn FnMut(Value) + Send>;

/// Application callbacks for session lifecycle events.
///
/// All methods have empty default implementations.
pub trait SessionHandler: Send + 'static {
    /// The handshake completed. `session` may be cloned and kept.
    fn on_open(&mut self, session: &WampSession) { let _ = session; }

    /// The session ended. Pending calls have already been failed.
    fn on_close(&mut self, reason: CloseReason, detail: &str) { let _ = (reason, detail); }

    /// The peer declared a CURIE prefix. Prefixes are not expanded.
    fn on_prefix(&mut self, prefix: &str, uri: &str) { let _ = (prefix, uri); }
}

impl SessionHandler for () {}

#[derive(Default)]
struct SessionState {
    pending: PendingCalls,
    subscriptions: DashMap<String, Arc<Mutex<EventFn>>>,
    closed: CancellationToken,
}

impl SessionState {
    fn dispatch(&self, envelope: WampEnvelope) -> Option<(String, String)> {
        match envelope {
            WampEnvelope::CallResult { call_id, result } => {
                self.complete(&call_id, Ok(result));
            }
            WampEnvelope::CallError {
                call_id,
                error_uri,
                error_desc,
            } => {
                self.complete(&call_id, Err(CallError::Remote {
                    error_uri,
                    error_desc,
                }));
            }
            WampEnvelope::Event { topic, event } => self.deliver_event(&topic, event),
            WampEnvelope::Prefix { prefix, uri } => return Some((prefix, uri)),
            other => log::warn!("ignoring envelope with tag {} sent by server", other.tag()),
        }
        None
    }

    fn complete(&self, call_id: &str, outcome: Result<Value, CallError>) {
        if !self.pending.complete(call_id, outcome) {
            debug!(call_id, "dropping result for unknown call");
        }
    }

    fn deliver_event(&self, topic: &str, event: Value) {
        let Some(handler) = self
            .subscriptions
            .get(topic)
            .map(|entry| Arc::clone(entry.value()))
        else {
            debug!(topic, "dropping event for topic without subscription");
            return;
        };
        let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
        guard_callback("event handler", || handler(event));
    }
}

/// Handle to an RPC session.
///
/// Cloning is cheap; all clones refer to the same connection.
///
/// # Examples
///
/// ```no_run
/// use serde_json::json;
/// use wampframe::wamp::WampSession;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = WampSession::connect("ws://127.0.0.1:9000/", ()).await?;
/// let sum: i64 = session
///     .call_async("http://example.com/calc#add", [json!(23), json!(19)])
///     .await?;
/// assert_eq!(sum, 42);
/// session.close();
/// session.closed().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WampSession {
    sender: WebSocketSender,
    state: Arc<SessionState>,
    random: SharedRandom,
}

impl std::fmt::Debug for WampSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WampSession")
            .field("status", &self.sender.status())
            .field("pending", &self.state.pending)
            .field("subscriptions", &self.state.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl WampSession {
    /// Start configuring a session.
    #[must_use]
    pub fn builder() -> WampSessionBuilder { WampSessionBuilder::default() }

    /// Connect with default options.
    ///
    /// # Errors
    ///
    /// See [`WampSessionBuilder::connect`].
    pub async fn connect<H: SessionHandler>(uri: &str, handler: H) -> Result<Self, ConnectError> {
        Self::builder().connect(uri, handler).await
    }

    /// Call `procedure` and hand the decoded result to `callback`.
    ///
    /// `callback` runs once on the connection's dispatcher: with the result,
    /// with [`CallError::Remote`] when the peer reports an error, with
    /// [`CallError::Decode`] when the result is not a `T`, or with
    /// [`CallError::ConnectionClosed`] if the connection ends first.
    ///
    /// Returns the call id.
    ///
    /// # Errors
    ///
    /// Returns [`WampError`] when the call cannot be sent. `callback` is not
    /// invoked in that case. If teardown fails the call before the send
    /// error is seen, `callback` has already received
    /// [`CallError::ConnectionClosed`] and the call id is returned instead.
    pub fn call<T, F, I>(&self, procedure: &str, args: I, callback: F) -> Result<String, WampError>
    where
        T: DeserializeOwned,
        F: FnOnce(Result<T, CallError>) + Send + 'static,
        I: IntoIterator<Item = Value>,
    {
        let completion = Box::new(move |outcome: Result<Value, CallError>| {
            callback(outcome.and_then(|value| serde_json::from_value(value).map_err(CallError::Decode)));
        });
        let call_id = self
            .state
            .pending
            .register(self.random.as_ref(), procedure, completion);
        let envelope = WampEnvelope::Call {
            call_id: call_id.clone(),
            procedure: procedure.to_owned(),
            args: args.into_iter().collect(),
        };
        if let Err(e) = self.send(&envelope) {
            return self.unsent(call_id, e);
        }
        debug!(call_id, procedure, "call sent");
        Ok(call_id)
    }

    /// Withdraw a call whose envelope could not be queued.
    ///
    /// Reports `error` only if the completion has not run yet.
    fn unsent(&self, call_id: String, error: WampError) -> Result<String, WampError> {
        if self.state.pending.cancel(&call_id) {
            return Err(error);
        }
        debug!(call_id, error = %error, "call already failed by teardown");
        Ok(call_id)
    }

    /// Call `procedure` and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] when the call cannot be sent, the peer reports
    /// an error, the result is not a `T`, or the connection closes first.
    pub async fn call_async<T, I>(&self, procedure: &str, args: I) -> Result<T, CallError>
    where
        T: DeserializeOwned + Send + 'static,
        I: IntoIterator<Item = Value>,
    {
        let (tx, rx) = oneshot::channel();
        self.call(procedure, args, move |outcome: Result<T, CallError>| {
            let _ = tx.send(outcome);
        })?;
        rx.await.unwrap_or(Err(CallError::ConnectionClosed))
    }

    /// Subscribe to `topic`, replacing any existing handler for it.
    ///
    /// Events whose payload is not a `T` are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WampError`] when the subscription cannot be sent.
    pub fn subscribe<T, F>(&self, topic: &str, mut handler: F) -> Result<(), WampError>
    where
        T: DeserializeOwned,
        F: FnMut(T) + Send + 'static,
    {
        let owned_topic = topic.to_owned();
        let event_fn: EventFn = Box::new(move |event| match serde_json::from_value(event) {
            Ok(event) => handler(event),
            Err(e) => log::warn!("dropping event on {owned_topic}: {e}"),
        });
        self.state
            .subscriptions
            .insert(topic.to_owned(), Arc::new(Mutex::new(event_fn)));
        self.send(&WampEnvelope::Subscribe {
            topic: topic.to_owned(),
        })
        .inspect_err(|_| {
            self.state.subscriptions.remove(topic);
        })
    }

    /// Stop receiving events for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`WampError`] when the request cannot be sent. The local
    /// handler is removed regardless.
    pub fn unsubscribe(&self, topic: &str) -> Result<(), WampError> {
        self.state.subscriptions.remove(topic);
        self.send(&WampEnvelope::Unsubscribe {
            topic: topic.to_owned(),
        })
    }

    /// Publish `event` to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`WampError`] when `event` cannot be serialized or sent.
    pub fn publish<E: Serialize>(&self, topic: &str, event: &E) -> Result<(), WampError> {
        self.send(&WampEnvelope::Publish {
            topic: topic.to_owned(),
            event: serde_json::to_value(event)?,
        })
    }

    /// Declare a CURIE prefix to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`WampError`] when the declaration cannot be sent.
    pub fn prefix(&self, prefix: &str, uri: &str) -> Result<(), WampError> {
        self.send(&WampEnvelope::Prefix {
            prefix: prefix.to_owned(),
            uri: uri.to_owned(),
        })
    }

    /// Number of calls still awaiting a result.
    #[must_use]
    pub fn pending_calls(&self) -> usize { self.state.pending.len() }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.sender.is_connected() }

    /// Wait for the opening handshake. `false` means the session closed
    /// without opening.
    ///
    /// Calls, subscriptions and publications fail with
    /// [`SendError::NotOpen`](crate::SendError::NotOpen) until then.
    pub async fn opened(&self) -> bool { self.sender.opened().await }

    /// Start the close handshake. Has no effect once closing has started.
    pub fn close(&self) {
        if let Err(e) = self.sender.close(CloseCode::NORMAL, None) {
            debug!(error = %e, "session close skipped");
        }
    }

    /// Tear down without a close handshake.
    pub fn disconnect(&self) { self.sender.disconnect(); }

    /// Wait until the session has closed and `on_close` has returned.
    pub async fn closed(&self) { self.state.closed.cancelled().await; }

    fn send(&self, envelope: &WampEnvelope) -> Result<(), WampError> {
        let json = envelope.to_json()?;
        self.sender.send_raw_text(Bytes::from(json))?;
        Ok(())
    }
}

/// Configures and opens a [`WampSession`].
#[derive(Default)]
pub struct WampSessionBuilder {
    connection: WebSocketConnectionBuilder,
    random: Option<SharedRandom>,
}

impl std::fmt::Debug for WampSessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WampSessionBuilder")
            .field("connection", &self.connection)
            .field("seeded", &self.random.is_some())
            .finish()
    }
}

impl WampSessionBuilder {
    /// Use a snapshot of `options`. Raw text delivery is always enabled.
    #[must_use]
    pub fn options(mut self, options: &Options) -> Self {
        self.connection = self.connection.options(options);
        self
    }

    /// Draw call ids, masking keys and handshake keys from `random`.
    #[must_use]
    pub fn random(mut self, random: SharedRandom) -> Self {
        self.connection = self.connection.random(Arc::clone(&random));
        self.random = Some(random);
        self
    }

    /// Send `origin` in the handshake's `Origin` header.
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.connection = self.connection.origin(origin);
        self
    }

    /// Bound the TCP connect. The opening handshake is bounded separately
    /// by [`Options::open_handshake_timeout`].
    #[must_use]
    pub fn connect_timeout(mut self, limit: Duration) -> Self {
        self.connection = self.connection.connect_timeout(limit);
        self
    }

    /// Connect to `uri`, offering the `wamp` subprotocol.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the URI is invalid or the TCP connection
    /// fails. `handler.on_close` receives
    /// [`CloseReason::CannotConnect`] first.
    pub async fn connect<H: SessionHandler>(self, uri: &str, handler: H) -> Result<WampSession, ConnectError> {
        let mut options = self.connection.current_options().clone();
        options.set_receive_text_as_raw(true);
        let random = self.random.unwrap_or_else(thread_random);
        let state = Arc::new(SessionState::default());
        let adapter = WampAdapter {
            handler,
            state: Arc::clone(&state),
            random: Arc::clone(&random),
        };
        let connection: WebSocketConnection = self
            .connection
            .options(&options)
            .protocols([WAMP_SUBPROTOCOL])
            .connect(uri, adapter)
            .await?;
        Ok(WampSession {
            sender: connection.sender().clone(),
            state,
            random,
        })
    }
}

/// Bridges connection events to the session.
struct WampAdapter<H> {
    handler: H,
    state: Arc<SessionState>,
    random: SharedRandom,
}

impl<H: SessionHandler> WampAdapter<H> {
    fn receive(&mut self, payload: &[u8]) {
        match WampEnvelope::from_slice(payload) {
            Ok(envelope) => {
                if let Some((prefix, uri)) = self.state.dispatch(envelope) {
                    self.handler.on_prefix(&prefix, &uri);
                }
            }
            Err(e) => log::warn!("dropping malformed envelope: {e}"),
        }
    }
}

impl<H: SessionHandler> WebSocketHandler for WampAdapter<H> {
    fn on_open(&mut self, sender: &WebSocketSender) {
        info!("session open");
        let session = WampSession {
            sender: sender.clone(),
            state: Arc::clone(&self.state),
            random: Arc::clone(&self.random),
        };
        self.handler.on_open(&session);
    }

    fn on_close(&mut self, reason: CloseReason, detail: &str) {
        let failed = self.state.pending.fail_all();
        self.state.subscriptions.clear();
        info!(%reason, failed_calls = failed, "session closed");
        guard_callback("on_close", || self.handler.on_close(reason, detail));
        self.state.closed.cancel();
    }

    fn on_text_message(&mut self, text: String) { self.receive(text.as_bytes()); }

    fn on_raw_text_message(&mut self, payload: Bytes) { self.receive(&payload); }

    fn on_binary_message(&mut self, payload: Bytes) {
        log::warn!("ignoring {} byte binary message", payload.len());
    }
}
