//! `drpc-ctl call` — send one call and print the response.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use drpc::{Call, ClientConnection, Response, Status};

#[derive(Serialize)]
struct CallSummary {
    sequence: i64,
    status: String,
    body_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_utf8: Option<String>,
}

impl From<&Response> for CallSummary {
    fn from(resp: &Response) -> Self {
        let status = match Status::try_from(resp.status) {
            Ok(s) => s.name().to_string(),
            Err(_) => resp.status.to_string(),
        };
        Self {
            sequence: resp.sequence,
            status,
            body_hex: hex::encode(&resp.body),
            body_utf8: String::from_utf8(resp.body.clone()).ok(),
        }
    }
}

/// Body argument: UTF-8 text, or raw bytes written as `hex:<digits>`.
pub fn parse_body(arg: Option<&str>) -> Result<Vec<u8>> {
    match arg {
        None => Ok(Vec::new()),
        Some(text) => match text.strip_prefix("hex:") {
            Some(digits) => hex::decode(digits).context("body after hex: is not valid hex"),
            None => Ok(text.as_bytes().to_vec()),
        },
    }
}

pub async fn cmd_call(
    socket: &Path,
    module: &str,
    method: &str,
    body: Option<&str>,
    timeout: Duration,
) -> Result<()> {
    let module: i32 = module.parse().context("module must be a number")?;
    let method: i32 = method.parse().context("method must be a number")?;
    let body = parse_body(body)?;

    let cancel = CancellationToken::new();
    if !timeout.is_zero() {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        });
    }
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let client = ClientConnection::new(socket);
    client
        .connect(&cancel)
        .await
        .with_context(|| format!("failed to connect to {} — is a server running?", socket.display()))?;

    let result = client.send_msg(&cancel, Call::new(module, method, body)).await;
    if let Err(e) = client.close().await {
        tracing::warn!(error = %e, "failed to close connection");
    }
    let resp = result.context("call failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&CallSummary::from(&resp))?
    );
    Ok(())
}
