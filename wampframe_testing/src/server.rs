//! Scripted loopback WebSocket server.
//!
//! [`ScriptedServer`] accepts real TCP connections from the client under
//! test, answers the handshake, and lets a test push raw frames and read the
//! client's frames with masking removed.

use std::{io, net::SocketAddr, time::Duration};

use bytes::{Buf, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use wampframe::frame::apply_mask;

use crate::frames::{SWITCHING_PROTOCOLS, server_frame};

/// Upper bound on how long any single read waits for the client.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener bound to an ephemeral loopback port.
#[derive(Debug)]
pub struct ScriptedServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl ScriptedServer {
    /// Bind to `127.0.0.1:0`.
    ///
    /// # Errors
    ///
    /// Propagates bind failures.
    pub async fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    /// `ws://` URI for `path_and_query` on this server.
    pub fn url(&self, path_and_query: &str) -> String { format!("ws://{}{path_and_query}", self.addr) }

    /// Accept a connection and answer its handshake with `101`.
    ///
    /// # Errors
    ///
    /// Fails when the client disconnects before completing its request.
    pub async fn accept(&self) -> io::Result<ServerConnection> {
        self.accept_with(SWITCHING_PROTOCOLS).await
    }

    /// Accept a connection and read its handshake without answering it.
    ///
    /// # Errors
    ///
    /// See [`accept`](Self::accept).
    pub async fn accept_unanswered(&self) -> io::Result<ServerConnection> { self.accept_with("").await }

    /// Accept a connection and answer its handshake with `response` verbatim.
    ///
    /// # Errors
    ///
    /// See [`accept`](Self::accept).
    pub async fn accept_with(&self, response: &str) -> io::Result<ServerConnection> {
        let (stream, _) = self.listener.accept().await?;
        let mut conn = ServerConnection {
            stream,
            buf: BytesMut::new(),
            request: ClientRequest::default(),
        };
        conn.request = conn.read_request().await?;
        conn.send_raw(response.as_bytes()).await?;
        Ok(conn)
    }
}

/// The client's handshake request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl ClientRequest {
    /// Value of the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A frame read from the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientFrame {
    pub fin: bool,
    pub opcode: u8,
    pub masked: bool,
    pub mask: [u8; 4],
    /// Payload with masking removed.
    pub payload: Vec<u8>,
}

impl ClientFrame {
    /// Payload as UTF-8 text.
    ///
    /// # Panics
    ///
    /// Panics if the payload is not UTF-8.
    pub fn text(&self) -> &str { std::str::from_utf8(&self.payload).expect("frame payload is not UTF-8") }
}

/// Server end of one accepted connection.
#[derive(Debug)]
pub struct ServerConnection {
    stream: TcpStream,
    buf: BytesMut,
    request: ClientRequest,
}

impl ServerConnection {
    /// The handshake request sent by the client.
    pub fn request(&self) -> &ClientRequest { &self.request }

    /// Write `bytes` unchanged.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Write one unmasked frame.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn send_frame(&mut self, opcode: u8, fin: bool, payload: &[u8]) -> io::Result<()> {
        self.send_raw(&server_frame(opcode, fin, payload)).await
    }

    /// Read the next client frame, or `None` once the client closed the
    /// transport.
    ///
    /// # Errors
    ///
    /// Fails on read errors or after [`READ_TIMEOUT`] without data.
    pub async fn read_frame(&mut self) -> io::Result<Option<ClientFrame>> {
        if !self.fill(2).await? {
            return Ok(None);
        }
        let fin = self.buf[0] & 0x80 != 0;
        let opcode = self.buf[0] & 0x0F;
        let masked = self.buf[1] & 0x80 != 0;
        let (len, ext) = match self.buf[1] & 0x7F {
            126 => {
                self.require(4).await?;
                (usize::from(u16::from_be_bytes([self.buf[2], self.buf[3]])), 2)
            }
            127 => {
                self.require(10).await?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&self.buf[2..10]);
                let len = usize::try_from(u64::from_be_bytes(raw))
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                (len, 8)
            }
            small => (usize::from(small), 0),
        };
        let mask_len = if masked { 4 } else { 0 };
        let header_len = 2 + ext + mask_len;
        self.require(header_len + len).await?;
        let mut mask = [0u8; 4];
        if masked {
            mask.copy_from_slice(&self.buf[2 + ext..header_len]);
        }
        self.buf.advance(header_len);
        let mut payload = self.buf.split_to(len).to_vec();
        if masked {
            apply_mask(&mut payload, mask);
        }
        Ok(Some(ClientFrame {
            fin,
            opcode,
            masked,
            mask,
            payload,
        }))
    }

    /// Read the next frame, failing if the client closed the transport.
    ///
    /// # Errors
    ///
    /// See [`read_frame`](Self::read_frame).
    pub async fn expect_frame(&mut self) -> io::Result<ClientFrame> {
        self.read_frame()
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "client closed transport"))
    }

    /// Read frames until the client closes its side of the transport.
    ///
    /// # Errors
    ///
    /// See [`read_frame`](Self::read_frame).
    pub async fn wait_for_eof(&mut self) -> io::Result<Vec<ClientFrame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.read_frame().await? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Close the transport without a close handshake.
    ///
    /// # Errors
    ///
    /// Propagates shutdown failures.
    pub async fn shutdown(mut self) -> io::Result<()> { self.stream.shutdown().await }

    async fn read_request(&mut self) -> io::Result<ClientRequest> {
        loop {
            let mut headers = [httparse::EMPTY_HEADER; 32];
            let mut req = httparse::Request::new(&mut headers);
            let status = req
                .parse(&self.buf)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if let httparse::Status::Complete(len) = status {
                let request = ClientRequest {
                    method: req.method.unwrap_or_default().to_owned(),
                    target: req.path.unwrap_or_default().to_owned(),
                    headers: req
                        .headers
                        .iter()
                        .map(|h| (h.name.to_owned(), String::from_utf8_lossy(h.value).into_owned()))
                        .collect(),
                };
                self.buf.advance(len);
                return Ok(request);
            }
            if !self.read_more().await? {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "client closed before finishing handshake",
                ));
            }
        }
    }

    async fn require(&mut self, n: usize) -> io::Result<()> {
        if self.fill(n).await? {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated client frame"))
        }
    }

    /// Buffer at least `n` bytes. `false` on end of stream.
    async fn fill(&mut self, n: usize) -> io::Result<bool> {
        while self.buf.len() < n {
            if !self.read_more().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn read_more(&mut self) -> io::Result<bool> {
        let read = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "client sent nothing"))??;
        Ok(read > 0)
    }
}
