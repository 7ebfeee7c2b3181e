//! WebSocket client connections.
//!
//! Each connection runs three tasks:
//!
//! - a **reader** that owns the read half of the transport and the frame decoder,
//! - a **writer** that owns the write half and drains a FIFO queue of outgoing messages,
//! - a **dispatcher** that receives decoded messages and I/O faults, invokes the
//!   [`WebSocketHandler`], answers pings and close frames, and performs teardown exactly once.
//!
//! The tasks communicate only through channels. The application queues
//! messages through a [`WebSocketSender`], which never blocks on the peer.

mod dispatch;
mod handler;
mod reader;
mod sender;
mod writer;

use std::{sync::Arc, time::Duration};

pub use handler::{CloseReason, WebSocketHandler};
pub use sender::WebSocketSender;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::{Notify, mpsc, watch},
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use self::dispatch::Dispatcher;
use crate::{
    codec::WebSocketCodec,
    error::{ConnectError, SendError},
    handshake::{ClientHandshakeRequest, WsUri},
    message::{CloseCode, Message},
    metrics,
    options::Options,
    panic::guard_callback,
    rng::{SharedRandom, thread_random},
};

/// Trait alias for transports a connection can run over.
pub trait ClientStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T> ClientStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Lifecycle of a connection as seen by the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Handshake sent, response pending.
    Connecting,
    /// Handshake accepted.
    Open,
    /// Torn down. A new connection is needed to continue.
    Closed,
}

/// Configures and opens a [`WebSocketConnection`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use wampframe::{Options, WebSocketConnection, WebSocketHandler};
///
/// struct Quiet;
/// impl WebSocketHandler for Quiet {}
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), wampframe::ConnectError> {
/// let mut options = Options::default();
/// options.set_receive_text_as_raw(true);
/// let connection = WebSocketConnection::builder()
///     .options(&options)
///     .origin("http://localhost")
///     .connect_timeout(Duration::from_secs(5))
///     .connect("ws://127.0.0.1:9001/", Quiet)
///     .await?;
/// connection.closed().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WebSocketConnectionBuilder {
    options: Options,
    random: SharedRandom,
    origin: Option<String>,
    protocols: Vec<String>,
    connect_timeout: Option<Duration>,
}

impl std::fmt::Debug for WebSocketConnectionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnectionBuilder")
            .field("options", &self.options)
            .field("origin", &self.origin)
            .field("protocols", &self.protocols)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for WebSocketConnectionBuilder {
    fn default() -> Self {
        Self {
            options: Options::default(),
            random: thread_random(),
            origin: None,
            protocols: Vec::new(),
            connect_timeout: None,
        }
    }
}

impl WebSocketConnectionBuilder {
    /// Use a snapshot of `options`. Later changes to `options` do not affect
    /// the connection.
    #[must_use]
    pub fn options(mut self, options: &Options) -> Self {
        self.options = options.clone();
        self
    }

    /// Draw masking and handshake keys from `random`.
    #[must_use]
    pub fn random(mut self, random: SharedRandom) -> Self {
        self.random = random;
        self
    }

    /// Send an `Origin` header with the handshake.
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Offer subprotocols during the handshake.
    #[must_use]
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Bound the TCP connect.
    #[must_use]
    pub fn connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = Some(limit);
        self
    }

    /// Options the connection will snapshot.
    #[must_use]
    pub fn current_options(&self) -> &Options { &self.options }

    /// Open a TCP connection to `uri` and start the handshake.
    ///
    /// Returns once the transport is connected; `on_open` fires when the
    /// server accepts the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the URI is invalid or the TCP connection
    /// fails. The handler's `on_close` receives
    /// [`CloseReason::CannotConnect`] before the error is returned.
    pub async fn connect<H>(self, uri: &str, mut handler: H) -> Result<WebSocketConnection, ConnectError>
    where
        H: WebSocketHandler,
    {
        match self.open_tcp(uri).await {
            Ok((stream, parsed)) => Ok(self.connect_with_stream(stream, &parsed, handler)),
            Err(e) => {
                warn!(uri, error = %e, "websocket connect failed");
                let detail = e.to_string();
                guard_callback("on_close", || {
                    handler.on_close(CloseReason::CannotConnect, &detail);
                });
                Err(e)
            }
        }
    }

    async fn open_tcp(&self, uri: &str) -> Result<(TcpStream, WsUri), ConnectError> {
        let parsed: WsUri = uri.parse()?;
        let authority = parsed.authority();
        let connect = TcpStream::connect(authority.as_str());
        let stream = match self.connect_timeout {
            Some(limit) => timeout(limit, connect)
                .await
                .map_err(|_| ConnectError::Timeout {
                    authority: authority.clone(),
                })?,
            None => connect.await,
        }
        .map_err(|source| ConnectError::Tcp {
            authority: authority.clone(),
            source,
        })?;
        if let Err(e) = stream.set_nodelay(self.options.tcp_nodelay()) {
            debug!(error = %e, "failed to configure TCP_NODELAY");
        }
        Ok((stream, parsed))
    }

    /// Start the handshake over an already connected transport.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn connect_with_stream<S, H>(self, stream: S, uri: &WsUri, handler: H) -> WebSocketConnection
    where
        S: ClientStream,
        H: WebSocketHandler,
    {
        let codec = WebSocketCodec::with_random(self.options.clone(), self.random);
        let (read_half, write_half) = tokio::io::split(stream);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);

        let mut request = ClientHandshakeRequest::new(uri).protocols(self.protocols);
        if let Some(origin) = self.origin {
            request = request.origin(origin);
        }
        let close_started = Arc::new(Notify::new());
        let sender = WebSocketSender::new(
            outgoing_tx,
            events_tx.clone(),
            status_rx.clone(),
            Arc::clone(&close_started),
        );
        sender.enqueue_internal(Message::ClientHandshake(request));

        let tracker = TaskTracker::new();
        let reader_quit = CancellationToken::new();
        let reader = tracker.spawn(reader::run(
            read_half,
            codec.decoder(),
            events_tx.clone(),
            reader_quit.clone(),
            self.options.socket_receive_timeout(),
        ));
        let writer = tracker.spawn(writer::run(
            write_half,
            codec.encoder(),
            outgoing_rx,
            events_tx,
        ));
        let peer = format!("{}{}", uri.authority(), uri.path());
        let dispatcher = Dispatcher {
            handler,
            sender: sender.clone(),
            events: events_rx,
            status: status_tx,
            reader,
            writer,
            reader_quit,
            peer: peer.clone(),
            close_started,
            open_handshake_timeout: self.options.open_handshake_timeout(),
            close_handshake_timeout: self.options.close_handshake_timeout(),
        };
        tracker.spawn(dispatcher.run());
        tracker.close();

        metrics::inc_connections();
        info!(peer, "websocket handshake sent");
        WebSocketConnection {
            sender,
            status: status_rx,
            tracker,
        }
    }
}

/// A running WebSocket client connection.
///
/// Dropping the value does not close the connection; use
/// [`close`](Self::close) or [`disconnect`](Self::disconnect).
#[derive(Debug)]
pub struct WebSocketConnection {
    sender: WebSocketSender,
    status: watch::Receiver<ConnectionStatus>,
    tracker: TaskTracker,
}

impl WebSocketConnection {
    /// Start configuring a connection.
    #[must_use]
    pub fn builder() -> WebSocketConnectionBuilder { WebSocketConnectionBuilder::default() }

    /// Connect with default options.
    ///
    /// # Errors
    ///
    /// See [`WebSocketConnectionBuilder::connect`].
    pub async fn connect<H: WebSocketHandler>(uri: &str, handler: H) -> Result<Self, ConnectError> {
        Self::builder().connect(uri, handler).await
    }

    /// Handle for queueing messages.
    #[must_use]
    pub fn sender(&self) -> &WebSocketSender { &self.sender }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus { *self.status.borrow() }

    /// Whether the handshake completed and the connection has not closed.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.status() == ConnectionStatus::Open }

    /// Wait for the opening handshake to finish.
    ///
    /// See [`WebSocketSender::opened`].
    pub async fn opened(&self) -> bool { self.sender.opened().await }

    /// Queue a text message.
    ///
    /// # Errors
    ///
    /// See [`WebSocketSender::send_text`].
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.sender.send_text(text)
    }

    /// Queue a binary message.
    ///
    /// # Errors
    ///
    /// See [`WebSocketSender::send_binary`].
    pub fn send_binary(&self, payload: impl Into<bytes::Bytes>) -> Result<(), SendError> {
        self.sender.send_binary(payload)
    }

    /// Start the close handshake.
    ///
    /// # Errors
    ///
    /// See [`WebSocketSender::close`].
    pub fn close(&self, code: CloseCode, reason: Option<&str>) -> Result<(), SendError> {
        self.sender.close(code, reason)
    }

    /// Tear down without a close handshake.
    pub fn disconnect(&self) { self.sender.disconnect(); }

    /// Wait until teardown has finished and `on_close` has returned.
    pub async fn closed(&self) { self.tracker.wait().await; }
}
