//! Reader task: transport bytes in, decoded messages out.

use std::{io, time::Duration};

use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    time::timeout,
};
use tokio_util::{codec::Decoder, sync::CancellationToken};
use tracing::{debug, trace};

use crate::{
    codec::{CodecError, WebSocketDecoder},
    message::Message,
};

const READ_CHUNK: usize = 8 * 1024;

/// Read from `io` until end of stream, a fault, or `quit` is cancelled.
///
/// Every decoded message and the terminal event (`ConnectionLost`,
/// `ProtocolViolation`, or `TransportError`) are sent on `events`.
pub(crate) async fn run<R>(
    mut io: R,
    mut decoder: WebSocketDecoder,
    events: mpsc::UnboundedSender<Message>,
    quit: CancellationToken,
    receive_timeout: Option<Duration>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        if let Err(terminal) = drain(&mut decoder, &mut buf, &events) {
            if let Some(event) = terminal {
                let _ = events.send(event);
            }
            return;
        }

        buf.reserve(READ_CHUNK);
        let result = tokio::select! {
            biased;
            () = quit.cancelled() => {
                debug!("reader quit requested");
                return;
            }
            result = read_chunk(&mut io, &mut buf, receive_timeout) => result,
        };

        match result {
            Ok(Some(0)) => {
                debug!(buffered = buf.len(), "transport reached end of stream");
                let _ = events.send(Message::ConnectionLost);
                return;
            }
            Ok(Some(n)) => trace!(bytes = n, "transport read"),
            Ok(None) => trace!("read timeout elapsed; continuing to wait for data"),
            Err(e) => {
                debug!(error = %e, "transport read failed");
                let _ = events.send(Message::TransportError(e.to_string()));
                return;
            }
        }
    }
}

/// Decode every complete message in `buf`.
///
/// `Err(Some(event))` carries the terminal event to report, `Err(None)` means
/// the dispatcher is gone.
fn drain(
    decoder: &mut WebSocketDecoder,
    buf: &mut BytesMut,
    events: &mpsc::UnboundedSender<Message>,
) -> Result<(), Option<Message>> {
    loop {
        match decoder.decode(buf) {
            Ok(Some(message)) => events.send(message).map_err(|_| None)?,
            Ok(None) => return Ok(()),
            Err(CodecError::Violation(violation)) => {
                return Err(Some(Message::ProtocolViolation(violation)));
            }
            Err(other) => return Err(Some(Message::TransportError(other.to_string()))),
        }
    }
}

async fn read_chunk<R>(
    io: &mut R,
    buf: &mut BytesMut,
    limit: Option<Duration>,
) -> io::Result<Option<usize>>
where
    R: AsyncRead + Unpin,
{
    match limit {
        Some(limit) => match timeout(limit, io.read_buf(buf)).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        },
        None => io.read_buf(buf).await.map(Some),
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncWriteExt, sync::mpsc};
    use tokio_util::sync::CancellationToken;

    use super::run;
    use crate::{
        codec::{ProtocolViolation, WebSocketCodec},
        message::Message,
        options::Options,
    };

    #[tokio::test]
    async fn delivers_messages_then_connection_lost() {
        let (client, mut server) = tokio::io::duplex(64);
        let (events, mut rx) = mpsc::unbounded_channel();
        server.write_all(&[0x81, 0x02, b'h', b'i']).await.expect("write");
        drop(server);

        let decoder = WebSocketCodec::new(Options::default()).frame_decoder();
        run(client, decoder, events, CancellationToken::new(), None).await;

        assert_eq!(rx.recv().await, Some(Message::Text("hi".into())));
        assert_eq!(rx.recv().await, Some(Message::ConnectionLost));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn masked_frame_ends_with_violation() {
        let (client, mut server) = tokio::io::duplex(64);
        let (events, mut rx) = mpsc::unbounded_channel();
        server
            .write_all(&[0x81, 0x82, 1, 2, 3, 4, b'h' ^ 1, b'i' ^ 2])
            .await
            .expect("write");

        let decoder = WebSocketCodec::new(Options::default()).frame_decoder();
        run(client, decoder, events, CancellationToken::new(), None).await;

        assert_eq!(
            rx.recv().await,
            Some(Message::ProtocolViolation(ProtocolViolation::MaskedServerFrame))
        );
        drop(server);
    }

    #[tokio::test]
    async fn cancellation_stops_reader_silently() {
        let (client, _server) = tokio::io::duplex(64);
        let (events, mut rx) = mpsc::unbounded_channel();
        let quit = CancellationToken::new();
        quit.cancel();

        let decoder = WebSocketCodec::new(Options::default()).frame_decoder();
        run(client, decoder, events, quit, None).await;

        assert_eq!(rx.recv().await, None);
    }
}
