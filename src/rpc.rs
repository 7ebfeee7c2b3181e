//! One-shot RPC call mode.

use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use wampframe::{CallError, WampSession};

use crate::BoxError;

/// Interpret a command line argument as JSON, falling back to a string.
fn parse_argument(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

pub async fn run(url: &str, procedure: &str, args: &[String], timeout_secs: u64) -> Result<(), BoxError> {
    let session = WampSession::builder()
        .connect_timeout(Duration::from_secs(timeout_secs))
        .connect(url, ())
        .await?;
    if !session.opened().await {
        return Err("server did not accept the handshake".into());
    }
    let call = session.call_async::<Value, _>(procedure, args.iter().map(String::as_str).map(parse_argument));
    let outcome = timeout(Duration::from_secs(timeout_secs), call).await;
    session.close();
    match outcome {
        Ok(Ok(result)) => println!("{result}"),
        Ok(Err(CallError::Remote {
            error_uri,
            error_desc,
        })) => println!("error {error_uri}: {error_desc}"),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(format!("no result within {timeout_secs}s").into()),
    }
    session.closed().await;
    Ok(())
}
