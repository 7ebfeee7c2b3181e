//! Client side of the WebSocket fuzzing-server protocol.
//!
//! The server exposes three endpoints: `/getCaseCount` sends the number of
//! cases as a text message, `/runCase?case=N&agent=A` runs one case against
//! an echoing client, and `/updateReports?agent=A` regenerates the reports.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wampframe::{CloseReason, Options, WebSocketConnection, WebSocketHandler, WebSocketSender};

use crate::BoxError;

/// Payload ceiling large enough for the fuzzing server's largest cases.
const TESTEE_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Echoes every data message back to the server.
#[derive(Default)]
struct Echo {
    sender: Option<WebSocketSender>,
}

impl WebSocketHandler for Echo {
    fn on_open(&mut self, sender: &WebSocketSender) { self.sender = Some(sender.clone()); }

    fn on_raw_text_message(&mut self, payload: Bytes) {
        if let Some(sender) = &self.sender
            && let Err(e) = sender.send_raw_text(payload)
        {
            debug!(error = %e, "echo skipped");
        }
    }

    fn on_binary_message(&mut self, payload: Bytes) {
        if let Some(sender) = &self.sender
            && let Err(e) = sender.send_binary(payload)
        {
            debug!(error = %e, "echo skipped");
        }
    }
}

/// Forwards text messages to the caller.
struct Collect {
    texts: mpsc::UnboundedSender<String>,
}

impl WebSocketHandler for Collect {
    fn on_text_message(&mut self, text: String) { let _ = self.texts.send(text); }

    fn on_close(&mut self, reason: CloseReason, detail: &str) {
        if reason != CloseReason::Normal {
            warn!(%reason, detail, "control connection closed abnormally");
        }
    }
}

fn endpoint(base: &str, path_and_query: &str) -> String {
    format!("{}{path_and_query}", base.trim_end_matches('/'))
}

async fn fetch_texts(uri: &str) -> Result<Vec<String>, BoxError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = WebSocketConnection::connect(uri, Collect { texts: tx }).await?;
    connection.closed().await;
    let mut texts = Vec::new();
    while let Ok(text) = rx.try_recv() {
        texts.push(text);
    }
    Ok(texts)
}

/// Parse the case count sent by `/getCaseCount`.
fn parse_case_count(texts: &[String]) -> Result<u32, BoxError> {
    let text = texts.first().ok_or("server sent no case count")?;
    Ok(text.trim().parse()?)
}

pub async fn run(base: &str, agent: &str) -> Result<(), BoxError> {
    let count = parse_case_count(&fetch_texts(&endpoint(base, "/getCaseCount")).await?)?;
    info!(count, "running fuzzing cases");

    let mut options = Options::default();
    options.set_max_frame_payload_size(TESTEE_MAX_PAYLOAD)?;
    options.set_max_message_payload_size(TESTEE_MAX_PAYLOAD)?;
    options.set_receive_text_as_raw(true);

    for case in 1..=count {
        let uri = endpoint(base, &format!("/runCase?case={case}&agent={agent}"));
        debug!(case, "running case");
        match WebSocketConnection::builder()
            .options(&options)
            .connect(&uri, Echo::default())
            .await
        {
            Ok(connection) => connection.closed().await,
            Err(e) => warn!(case, error = %e, "case could not connect"),
        }
    }

    fetch_texts(&endpoint(base, &format!("/updateReports?agent={agent}"))).await?;
    info!(agent, "reports updated");
    Ok(())
}
