//! Opening handshake: WebSocket URIs, the client upgrade request, and the
//! server's response.

use std::fmt::Write as _;

use thiserror::Error;

use crate::codec::ProtocolViolation;

/// Largest handshake response head accepted from the server.
pub const MAX_HANDSHAKE_RESPONSE: usize = 16 * 1024;

const MAX_RESPONSE_HEADERS: usize = 64;
const DEFAULT_PORT: u16 = 80;

/// Reasons a WebSocket URI is rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UriError {
    /// No `scheme://` prefix.
    #[error("URI has no scheme: {0}")]
    MissingScheme(String),
    /// Scheme other than `ws` or `wss`.
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    /// `wss://` was requested.
    #[error("secure WebSockets not supported")]
    SecureNotSupported,
    /// The authority has no host.
    #[error("URI has no host")]
    MissingHost,
    /// The port is not a number in `1..=65535`.
    #[error("invalid port: {0}")]
    InvalidPort(String),
}

/// A parsed `ws://` URI.
///
/// ```
/// use wampframe::handshake::WsUri;
///
/// let uri: WsUri = "ws://example.com:9000/ws?x=1".parse().unwrap();
/// assert_eq!(uri.host(), "example.com");
/// assert_eq!(uri.port(), 9000);
/// assert_eq!(uri.path(), "/ws");
/// assert_eq!(uri.query(), Some("x=1"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsUri {
    host: String,
    port: u16,
    path: String,
    query: Option<String>,
}

impl WsUri {
    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// TCP port, 80 unless given.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }

    /// Request path, `/` when empty.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Query string without the leading `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }

    /// `host:port` pair suitable for a TCP connect.
    #[must_use]
    pub fn authority(&self) -> String { format!("{}:{}", self.host, self.port) }
}

impl std::str::FromStr for WsUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| UriError::MissingScheme(s.to_owned()))?;
        match scheme.to_ascii_lowercase().as_str() {
            "ws" => {}
            "wss" => return Err(UriError::SecureNotSupported),
            other => return Err(UriError::UnsupportedScheme(other.to_owned())),
        }

        let (authority, target) = match rest.find(['/', '?']) {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let (host, port) = split_host_port(authority)?;
        if host.is_empty() {
            return Err(UriError::MissingHost);
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        let path = if path.is_empty() { "/" } else { path };

        Ok(Self {
            host: host.to_owned(),
            port,
            path: path.to_owned(),
            query: query.filter(|q| !q.is_empty()).map(str::to_owned),
        })
    }
}

// A colon inside `[...]` belongs to an IPv6 literal, not a port.
fn split_host_port(authority: &str) -> Result<(&str, u16), UriError> {
    let Some(idx) = authority
        .rfind(':')
        .filter(|idx| !authority[*idx..].contains(']'))
    else {
        return Ok((authority, DEFAULT_PORT));
    };
    let (host, port) = (&authority[..idx], &authority[idx + 1..]);
    let port = port
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| UriError::InvalidPort(port.to_owned()))?;
    Ok((host, port))
}

/// The client's HTTP upgrade request.
///
/// The `Sec-WebSocket-Key` is drawn when the request is rendered, so the
/// request value itself stays deterministic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientHandshakeRequest {
    host: String,
    port: u16,
    path: String,
    query: Option<String>,
    origin: Option<String>,
    protocols: Vec<String>,
}

impl ClientHandshakeRequest {
    /// Request for `uri` with no origin or subprotocols.
    #[must_use]
    pub fn new(uri: &WsUri) -> Self {
        Self {
            host: uri.host.clone(),
            port: uri.port,
            path: uri.path.clone(),
            query: uri.query.clone(),
            origin: None,
            protocols: Vec::new(),
        }
    }

    /// Send an `Origin` header.
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Offer subprotocols in `Sec-WebSocket-Protocol`.
    #[must_use]
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Request target: path plus optional query.
    #[must_use]
    pub fn target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }

    /// Render the request head with the given `Sec-WebSocket-Key`.
    ///
    /// ```
    /// use wampframe::handshake::{ClientHandshakeRequest, WsUri};
    ///
    /// let uri: WsUri = "ws://localhost:9001/runCase?case=1".parse().unwrap();
    /// let text = ClientHandshakeRequest::new(&uri).render("a2V5");
    /// assert!(text.starts_with("GET /runCase?case=1 HTTP/1.1\r\nHost: localhost:9001\r\n"));
    /// assert!(text.ends_with("Sec-WebSocket-Version: 13\r\n\r\n"));
    /// ```
    #[must_use]
    pub fn render(&self, key: &str) -> String {
        let mut out = String::with_capacity(256);
        // Writing to a String cannot fail.
        let _ = write!(out, "GET {} HTTP/1.1\r\n", self.target());
        if self.port == DEFAULT_PORT {
            let _ = write!(out, "Host: {}\r\n", self.host);
        } else {
            let _ = write!(out, "Host: {}:{}\r\n", self.host, self.port);
        }
        out.push_str("Upgrade: websocket\r\n");
        out.push_str("Connection: Upgrade\r\n");
        let _ = write!(out, "Sec-WebSocket-Key: {key}\r\n");
        if let Some(origin) = &self.origin {
            let _ = write!(out, "Origin: {origin}\r\n");
        }
        if !self.protocols.is_empty() {
            let _ = write!(out, "Sec-WebSocket-Protocol: {}\r\n", self.protocols.join(", "));
        }
        out.push_str("Sec-WebSocket-Version: 13\r\n\r\n");
        out
    }
}

/// Parse the server's response head from the front of `src`.
///
/// Returns `Ok(None)` while the head is incomplete, otherwise the number of
/// bytes it occupies. Bytes after the head belong to the first frames and
/// must be kept.
///
/// # Errors
///
/// Returns [`ProtocolViolation::HandshakeRejected`] for any status other than
/// `101`, [`ProtocolViolation::MalformedHandshake`] when the head does not
/// parse, and [`ProtocolViolation::HandshakeTooLarge`] when the incomplete
/// head exceeds [`MAX_HANDSHAKE_RESPONSE`].
pub fn parse_response(src: &[u8]) -> Result<Option<usize>, ProtocolViolation> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    let status = response
        .parse(src)
        .map_err(|e| ProtocolViolation::MalformedHandshake {
            detail: e.to_string(),
        })?;
    let httparse::Status::Complete(len) = status else {
        if src.len() > MAX_HANDSHAKE_RESPONSE {
            return Err(ProtocolViolation::HandshakeTooLarge {
                max: MAX_HANDSHAKE_RESPONSE,
            });
        }
        return Ok(None);
    };
    match response.code {
        Some(101) => Ok(Some(len)),
        Some(code) => Err(ProtocolViolation::HandshakeRejected {
            status_line: format!("{code} {}", response.reason.unwrap_or_default()),
        }),
        None => Err(ProtocolViolation::MalformedHandshake {
            detail: "missing status code".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ClientHandshakeRequest, UriError, WsUri, parse_response};
    use crate::codec::ProtocolViolation;

    #[rstest]
    #[case("ws://example.com", "example.com", 80, "/", None)]
    #[case("ws://example.com:9001", "example.com", 9001, "/", None)]
    #[case("ws://127.0.0.1:9001/getCaseCount", "127.0.0.1", 9001, "/getCaseCount", None)]
    #[case("WS://host/path?a=1&b=2", "host", 80, "/path", Some("a=1&b=2"))]
    #[case("ws://host?agent=x", "host", 80, "/", Some("agent=x"))]
    #[case("ws://host/p?", "host", 80, "/p", None)]
    #[case("ws://[::1]:9000/", "[::1]", 9000, "/", None)]
    #[case("ws://[::1]", "[::1]", 80, "/", None)]
    fn parses_ws_uris(
        #[case] input: &str,
        #[case] host: &str,
        #[case] port: u16,
        #[case] path: &str,
        #[case] query: Option<&str>,
    ) {
        let uri: WsUri = input.parse().expect("valid uri");
        assert_eq!(uri.host(), host);
        assert_eq!(uri.port(), port);
        assert_eq!(uri.path(), path);
        assert_eq!(uri.query(), query);
    }

    #[rstest]
    #[case("example.com/ws", UriError::MissingScheme("example.com/ws".into()))]
    #[case("http://example.com", UriError::UnsupportedScheme("http".into()))]
    #[case("wss://example.com", UriError::SecureNotSupported)]
    #[case("ws:///path", UriError::MissingHost)]
    #[case("ws://host:abc/", UriError::InvalidPort("abc".into()))]
    #[case("ws://host:0/", UriError::InvalidPort("0".into()))]
    fn rejects_bad_uris(#[case] input: &str, #[case] expected: UriError) {
        assert_eq!(input.parse::<WsUri>(), Err(expected));
    }

    #[test]
    fn renders_full_request() {
        let uri: WsUri = "ws://example.com/ws".parse().expect("valid uri");
        let request = ClientHandshakeRequest::new(&uri)
            .origin("http://example.com")
            .protocols(["wamp"]);
        assert_eq!(
            request.render("dGhlIHNhbXBsZSBub25jZQ=="),
            "GET /ws HTTP/1.1\r\n\
             Host: example.com\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Origin: http://example.com\r\n\
             Sec-WebSocket-Protocol: wamp\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );
    }

    #[test]
    fn partial_response_waits() {
        assert_eq!(parse_response(b"HTTP/1.1 101 Switching"), Ok(None));
    }

    #[test]
    fn accepted_response_reports_head_length() {
        let head = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n";
        let mut bytes = head.to_vec();
        bytes.extend_from_slice(&[0x81, 0x00]);
        assert_eq!(parse_response(&bytes), Ok(Some(head.len())));
    }

    #[test]
    fn non_101_status_is_rejected() {
        assert_eq!(
            parse_response(b"HTTP/1.1 404 Not Found\r\n\r\n"),
            Err(ProtocolViolation::HandshakeRejected {
                status_line: "404 Not Found".into()
            })
        );
    }

    #[test]
    fn garbage_response_is_malformed() {
        assert!(matches!(
            parse_response(b"SSH-2.0-OpenSSH\r\n\r\n"),
            Err(ProtocolViolation::MalformedHandshake { .. })
        ));
    }
}
