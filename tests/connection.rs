//! Client connections against a scripted loopback server.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use rstest::rstest;
use tokio::{sync::mpsc, time::timeout};
use wampframe::{
    CloseCode,
    CloseReason,
    ConnectError,
    ConnectionStatus,
    Options,
    SendError,
    UriError,
    WebSocketConnection,
    WebSocketHandler,
};
use wampframe_testing::{
    Event,
    OP_BINARY,
    OP_CLOSE,
    OP_CONTINUATION,
    OP_PING,
    OP_PONG,
    OP_TEXT,
    RecordingHandler,
    ScriptedServer,
    close_payload,
    masked_frame,
};

async fn open(
    options: &Options,
) -> (
    ScriptedServer,
    WebSocketConnection,
    wampframe_testing::ServerConnection,
    wampframe_testing::Events,
) {
    let server = ScriptedServer::bind().await.expect("bind");
    let (handler, mut events) = RecordingHandler::new();
    let connection = WebSocketConnection::builder()
        .options(options)
        .connect(&server.url("/chat?room=1"), handler)
        .await
        .expect("connect");
    let peer = server.accept().await.expect("accept");
    assert_eq!(events.next().await, Some(Event::Open));
    (server, connection, peer, events)
}

#[tokio::test]
async fn handshake_request_carries_upgrade_headers() {
    let server = ScriptedServer::bind().await.expect("bind");
    let (handler, mut events) = RecordingHandler::new();
    let _connection = WebSocketConnection::builder()
        .origin("http://localhost")
        .protocols(["wamp"])
        .connect(&server.url("/ws?x=1"), handler)
        .await
        .expect("connect");
    let peer = server.accept().await.expect("accept");

    let request = peer.request();
    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/ws?x=1");
    assert_eq!(request.header("upgrade"), Some("websocket"));
    assert_eq!(request.header("connection"), Some("Upgrade"));
    assert_eq!(request.header("sec-websocket-version"), Some("13"));
    assert_eq!(request.header("origin"), Some("http://localhost"));
    assert_eq!(request.header("sec-websocket-protocol"), Some("wamp"));
    assert_eq!(request.header("sec-websocket-key").map(str::len), Some(24));
    assert_eq!(events.next().await, Some(Event::Open));
}

#[tokio::test]
async fn delivers_text_and_binary_in_order() {
    let (_server, connection, mut peer, mut events) = open(&Options::default()).await;
    assert!(connection.is_connected());

    peer.send_frame(OP_TEXT, true, "héllo".as_bytes()).await.expect("send");
    peer.send_frame(OP_BINARY, true, &[0, 1, 2]).await.expect("send");

    assert_eq!(events.next().await, Some(Event::Text("héllo".into())));
    assert_eq!(
        events.next().await,
        Some(Event::Binary(Bytes::from_static(&[0, 1, 2])))
    );
}

#[tokio::test]
async fn reassembles_fragmented_text_with_interleaved_ping() {
    let (_server, _connection, mut peer, mut events) = open(&Options::default()).await;
    let text = "fragmented €uro";
    let bytes = text.as_bytes();

    peer.send_frame(OP_TEXT, false, &bytes[..12]).await.expect("send");
    peer.send_frame(OP_PING, true, b"mid").await.expect("send");
    peer.send_frame(OP_CONTINUATION, true, &bytes[12..]).await.expect("send");

    let pong = peer.expect_frame().await.expect("pong");
    assert_eq!(pong.opcode, OP_PONG);
    assert_eq!(pong.payload, b"mid");
    assert_eq!(events.next().await, Some(Event::Text(text.into())));
}

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test]
async fn client_frames_follow_masking_option(#[case] mask: bool) {
    let mut options = Options::default();
    options.set_mask_outgoing_frames(mask);
    let (_server, connection, mut peer, _events) = open(&options).await;

    connection.send_text("hello").expect("send");
    connection.send_binary(vec![9_u8; 300]).expect("send");

    let text = peer.expect_frame().await.expect("text frame");
    assert!(text.fin);
    assert_eq!(text.opcode, OP_TEXT);
    assert_eq!(text.masked, mask);
    assert_eq!(text.text(), "hello");

    let binary = peer.expect_frame().await.expect("binary frame");
    assert_eq!(binary.opcode, OP_BINARY);
    assert_eq!(binary.payload, vec![9_u8; 300]);
    if mask {
        assert_ne!(text.mask, binary.mask);
    }
}

#[tokio::test]
async fn raw_text_mode_delivers_bytes() {
    let mut options = Options::default();
    options.set_receive_text_as_raw(true);
    let (_server, connection, mut peer, mut events) = open(&options).await;

    peer.send_frame(OP_TEXT, true, b"[3,\"id\",1]").await.expect("send");
    assert_eq!(
        events.next().await,
        Some(Event::RawText(Bytes::from_static(b"[3,\"id\",1]")))
    );

    assert_eq!(
        connection.sender().send_raw_text(vec![0xC3, 0x28]),
        Err(SendError::InvalidUtf8)
    );
    connection.sender().send_raw_text("ok").expect("send");
    assert_eq!(peer.expect_frame().await.expect("frame").text(), "ok");
}

#[tokio::test]
async fn pong_reaches_handler_and_ping_is_sent() {
    let (_server, connection, mut peer, mut events) = open(&Options::default()).await;

    connection.sender().send_ping("are you there").expect("ping");
    let ping = peer.expect_frame().await.expect("ping frame");
    assert_eq!(ping.opcode, OP_PING);
    peer.send_frame(OP_PONG, true, &ping.payload).await.expect("pong");

    assert_eq!(
        events.next().await,
        Some(Event::Pong(Bytes::from_static(b"are you there")))
    );
    assert!(connection.sender().send_ping(vec![0_u8; 126]).is_err());
}

#[tokio::test]
async fn server_close_is_echoed() {
    let (_server, connection, mut peer, mut events) = open(&Options::default()).await;

    peer.send_frame(OP_CLOSE, true, &close_payload(1001, "restarting"))
        .await
        .expect("close");

    let echo = peer.expect_frame().await.expect("echo");
    assert_eq!(echo.opcode, OP_CLOSE);
    assert_eq!(echo.payload, 1001_u16.to_be_bytes());
    let (reason, detail) = events.expect_close().await;
    assert_eq!(reason, CloseReason::Normal);
    assert!(detail.contains("1001"), "{detail}");
    assert!(detail.contains("restarting"), "{detail}");

    connection.closed().await;
    assert_eq!(connection.status(), ConnectionStatus::Closed);
    assert_eq!(connection.send_text("late"), Err(SendError::NotConnected));
}

#[tokio::test]
async fn client_close_waits_for_server_reply() {
    let (_server, connection, mut peer, mut events) = open(&Options::default()).await;

    connection
        .close(CloseCode::NORMAL, Some("done"))
        .expect("close");
    assert_eq!(connection.send_text("after close"), Err(SendError::Closing));

    let close = peer.expect_frame().await.expect("close frame");
    assert_eq!(close.opcode, OP_CLOSE);
    assert_eq!(close.payload, close_payload(1000, "done"));
    assert!(events.drain().is_empty());

    peer.send_frame(OP_CLOSE, true, &close_payload(1000, ""))
        .await
        .expect("reply");
    assert_eq!(events.expect_close().await.0, CloseReason::Normal);
    assert!(peer.wait_for_eof().await.expect("eof").is_empty());
}

#[tokio::test]
async fn close_without_reply_times_out() {
    let mut options = Options::default();
    options
        .set_close_handshake_timeout(Some(Duration::from_millis(100)))
        .expect("positive timeout");
    let (_server, connection, mut peer, mut events) = open(&options).await;

    connection.close(CloseCode::NORMAL, None).expect("close");
    assert_eq!(peer.expect_frame().await.expect("close frame").opcode, OP_CLOSE);

    assert_eq!(
        events.expect_close().await,
        (CloseReason::Normal, "close handshake timed out".to_owned())
    );
    timeout(Duration::from_secs(5), connection.closed())
        .await
        .expect("teardown finished");
    assert!(peer.wait_for_eof().await.expect("eof").is_empty());
}

#[rstest]
#[case(CloseCode::from(1005))]
#[case(CloseCode::from(999))]
#[tokio::test]
async fn close_rejects_reserved_codes(#[case] code: CloseCode) {
    let (_server, connection, _peer, _events) = open(&Options::default()).await;
    assert!(matches!(
        connection.close(code, None),
        Err(SendError::Invalid(_))
    ));
    assert!(connection.is_connected());
}

#[tokio::test]
async fn disconnect_tears_down_without_close_frame() {
    let (_server, connection, mut peer, mut events) = open(&Options::default()).await;

    connection.disconnect();

    assert_eq!(
        events.expect_close().await,
        (CloseReason::Normal, "disconnected".to_owned())
    );
    assert!(peer.wait_for_eof().await.expect("eof").is_empty());
}

#[tokio::test]
async fn transport_drop_reports_connection_lost() {
    let (_server, connection, peer, mut events) = open(&Options::default()).await;

    drop(peer);

    assert_eq!(events.expect_close().await.0, CloseReason::ConnectionLost);
    connection.closed().await;
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn masked_server_frame_is_a_protocol_error() {
    let (_server, _connection, mut peer, mut events) = open(&Options::default()).await;

    peer.send_raw(&masked_frame(OP_TEXT, true, b"nope", [1, 2, 3, 4]))
        .await
        .expect("send");

    let close = peer.expect_frame().await.expect("close frame");
    assert_eq!(close.opcode, OP_CLOSE);
    assert_eq!(close.payload, 1002_u16.to_be_bytes());
    assert_eq!(events.expect_close().await.0, CloseReason::ProtocolError);
}

#[tokio::test]
async fn invalid_utf8_closes_with_invalid_payload() {
    let (_server, _connection, mut peer, mut events) = open(&Options::default()).await;

    peer.send_frame(OP_TEXT, true, &[b'a', 0xFF]).await.expect("send");

    let close = peer.expect_frame().await.expect("close frame");
    assert_eq!(close.payload, 1007_u16.to_be_bytes());
    let (reason, detail) = events.expect_close().await;
    assert_eq!(reason, CloseReason::ProtocolError);
    assert!(detail.contains("UTF-8"), "{detail}");
}

#[tokio::test]
async fn oversized_message_closes_with_too_big() {
    let mut options = Options::default();
    options.set_max_frame_payload_size(16).expect("frame size");
    options.set_max_message_payload_size(24).expect("message size");
    let (_server, _connection, mut peer, mut events) = open(&options).await;

    peer.send_frame(OP_BINARY, false, &[0; 16]).await.expect("send");
    peer.send_frame(OP_CONTINUATION, true, &[0; 16]).await.expect("send");

    let close = peer.expect_frame().await.expect("close frame");
    assert_eq!(close.payload, 1009_u16.to_be_bytes());
    assert_eq!(events.expect_close().await.0, CloseReason::ProtocolError);
}

#[tokio::test]
async fn rejected_handshake_cannot_connect() {
    let server = ScriptedServer::bind().await.expect("bind");
    let (handler, mut events) = RecordingHandler::new();
    let connection = WebSocketConnection::connect(&server.url("/missing"), handler)
        .await
        .expect("tcp connect");
    let _peer = server
        .accept_with("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
        .await
        .expect("accept");

    let (reason, detail) = events.expect_close().await;
    assert_eq!(reason, CloseReason::CannotConnect);
    assert!(detail.contains("404"), "{detail}");
    connection.closed().await;
    assert_eq!(connection.status(), ConnectionStatus::Closed);
}

#[tokio::test]
async fn sending_before_handshake_completes_is_refused() {
    let server = ScriptedServer::bind().await.expect("bind");
    let (handler, mut events) = RecordingHandler::new();
    let connection = WebSocketConnection::connect(&server.url("/"), handler)
        .await
        .expect("tcp connect");

    assert_eq!(connection.status(), ConnectionStatus::Connecting);
    assert_eq!(connection.send_text("early"), Err(SendError::NotOpen));
    assert_eq!(connection.send_binary(vec![1_u8]), Err(SendError::NotOpen));
    assert_eq!(
        connection.close(CloseCode::NORMAL, None),
        Err(SendError::NotOpen)
    );

    let mut peer = server.accept().await.expect("accept");
    assert!(connection.opened().await);
    assert_eq!(events.next().await, Some(Event::Open));
    connection.send_text("now").expect("send");

    let frame = peer.expect_frame().await.expect("first client frame");
    assert_eq!(frame.opcode, OP_TEXT);
    assert_eq!(frame.text(), "now");
}

#[tokio::test]
async fn unanswered_handshake_times_out() {
    let server = ScriptedServer::bind().await.expect("bind");
    let mut options = Options::default();
    options
        .set_open_handshake_timeout(Some(Duration::from_millis(100)))
        .expect("positive timeout");
    let (handler, mut events) = RecordingHandler::new();
    let connection = WebSocketConnection::builder()
        .options(&options)
        .connect(&server.url("/"), handler)
        .await
        .expect("tcp connect");
    let mut peer = server.accept_unanswered().await.expect("accept");

    assert_eq!(
        events.expect_close().await,
        (
            CloseReason::CannotConnect,
            "opening handshake timed out".to_owned()
        )
    );
    assert!(!connection.opened().await);
    timeout(Duration::from_secs(5), connection.closed())
        .await
        .expect("teardown finished");
    assert_eq!(connection.status(), ConnectionStatus::Closed);
    assert!(peer.wait_for_eof().await.expect("eof").is_empty());
}

#[tokio::test]
async fn refused_tcp_connection_reports_cannot_connect() {
    let server = ScriptedServer::bind().await.expect("bind");
    let url = server.url("/");
    drop(server);

    let (handler, mut events) = RecordingHandler::new();
    let err = WebSocketConnection::connect(&url, handler)
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, ConnectError::Tcp { .. }), "{err}");
    assert!(matches!(
        events.drain().as_slice(),
        [Event::Close(CloseReason::CannotConnect, _)]
    ));
}

#[rstest]
#[case("wss://127.0.0.1:9/", "secure")]
#[case("http://127.0.0.1:9/", "scheme")]
#[case("ws:///path", "host")]
#[tokio::test]
async fn invalid_uri_is_rejected(#[case] uri: &str, #[case] fragment: &str) {
    let (handler, mut events) = RecordingHandler::new();
    let err = WebSocketConnection::connect(uri, handler)
        .await
        .expect_err("invalid uri");
    assert!(matches!(err, ConnectError::Uri(_)), "{err}");
    assert!(err.to_string().contains(fragment), "{err}");
    assert_eq!(events.drain().len(), 1);
}

#[tokio::test]
async fn secure_scheme_has_dedicated_error() {
    let err = WebSocketConnection::connect("wss://example.com/", ())
        .await
        .expect_err("wss unsupported");
    assert!(matches!(err, ConnectError::Uri(UriError::SecureNotSupported)));
}

/// Panics on the first text message, records the rest.
struct PanicsOnce {
    panicked: Arc<AtomicBool>,
    texts: mpsc::UnboundedSender<String>,
}

impl WebSocketHandler for PanicsOnce {
    fn on_text_message(&mut self, text: String) {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("handler failure");
        }
        let _ = self.texts.send(text);
    }
}

#[tokio::test]
async fn handler_panic_does_not_end_connection() {
    let server = ScriptedServer::bind().await.expect("bind");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = WebSocketConnection::connect(&server.url("/"), PanicsOnce {
        panicked: Arc::new(AtomicBool::new(false)),
        texts: tx,
    })
    .await
    .expect("connect");
    let mut peer = server.accept().await.expect("accept");

    peer.send_frame(OP_TEXT, true, b"first").await.expect("send");
    peer.send_frame(OP_TEXT, true, b"second").await.expect("send");

    assert_eq!(rx.recv().await.as_deref(), Some("second"));
    assert!(connection.is_connected());
}
