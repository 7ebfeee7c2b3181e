//! Writer task: queued messages in, framed bytes out.

use bytes::BytesMut;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::codec::Encoder;
use tracing::{debug, trace, warn};

use crate::{codec::WebSocketEncoder, message::Message};

/// Write queued messages in FIFO order until `Quit` is dequeued, the queue
/// closes, or a write fails.
///
/// A write failure is reported on `events` as `TransportError`. The write
/// half is shut down on exit.
pub(crate) async fn run<W>(
    mut io: W,
    mut encoder: WebSocketEncoder,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<Message>,
) where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    while let Some(message) = outgoing.recv().await {
        if matches!(message, Message::Quit) {
            debug!("writer quit requested");
            break;
        }
        let kind = message.kind();
        if let Err(e) = encoder.encode(message, &mut buf) {
            warn!(kind, error = %e, "dropping message that cannot be encoded");
            buf.clear();
            continue;
        }
        if let Err(e) = io.write_all(&buf).await {
            warn!(kind, error = %e, "transport write failed");
            let _ = events.send(Message::TransportError(e.to_string()));
            return;
        }
        trace!(kind, bytes = buf.len(), "message written");
        buf.clear();
    }
    if let Err(e) = io.shutdown().await {
        debug!(error = %e, "failed to shut down write half");
    }
}
