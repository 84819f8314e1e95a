//! A newline delimited json front end over the gateway.
//!
//! Every line is one command, answered by one line:
//!
//! ```text
//! {"op": "predict", "request": {"startYear": 2010, "runtimeMinutes": 148, "numVotes": 2000000}}
//! {"op": "predict_batch", "requests": [{...}, {...}]}
//! {"op": "health"} | {"op": "model_info"} | {"op": "refresh"}
//! ```
//!
//! Replies are `{"ok": true, "result": ...}` or `{"ok": false, "error": {...}}`, batch results
//! hold one such reply per item. A line longer than `max_line_bytes` is answered with a
//! `line_too_long` error and the connection is closed.

use std::io;

use artifact::ArtifactStore;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
};

use crate::{error::ServingErr, gateway::Gateway};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Predict { request: Value },
    PredictBatch { requests: Vec<Value> },
    Health,
    ModelInfo,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
}

impl From<&ServingErr> for ErrorBody {
    fn from(value: &ServingErr) -> Self {
        Self {
            kind: value.kind().to_string(),
            message: value.to_string(),
            field: value.field().map(String::from),
            retryable: value.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    fn ok<T: Serialize>(result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self {
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(e) => Self::bad_request("internal_error", format!("unencodable reply: {e}")),
        }
    }

    fn err(err: &ServingErr) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(err.into()),
        }
    }

    fn from_result<T: Serialize>(result: &Result<T, ServingErr>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::err(e),
        }
    }

    fn bad_request(kind: &str, message: String) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                kind: kind.to_string(),
                message,
                field: None,
                retryable: false,
            }),
        }
    }
}

/// Answers a single command line.
pub async fn handle_line<S: ArtifactStore + 'static>(gateway: &Gateway<S>, line: &str) -> Reply {
    let command: Command = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(e) => return Reply::bad_request("bad_command", format!("invalid command: {e}")),
    };

    match command {
        Command::Predict { request } => Reply::from_result(&gateway.predict(request).await),
        Command::PredictBatch { requests } => match gateway.predict_batch(requests).await {
            Ok(results) => {
                let items: Vec<_> = results.iter().map(Reply::from_result).collect();
                Reply::ok(&items)
            }
            Err(e) => Reply::err(&e),
        },
        Command::Health => Reply::ok(&gateway.health()),
        Command::ModelInfo => Reply::from_result(&gateway.model_info()),
        Command::Refresh => Reply::from_result(&gateway.refresh().await),
    }
}

/// Serves commands from `rx` until it's closed, writing the replies to `tx`.
pub async fn serve_connection<S, R, W>(gateway: Gateway<S>, rx: R, mut tx: W) -> io::Result<()>
where
    S: ArtifactStore + 'static,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let max = gateway.config().max_line_bytes;
    let mut rx = BufReader::new(rx);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = (&mut rx).take(max as u64 + 1).read_until(b'\n', &mut buf).await?;
        if read == 0 {
            break;
        }

        if buf.len() > max && buf.last() != Some(&b'\n') {
            warn!("closing a connection after a line over {max} bytes");
            let message = format!("command lines are limited to {max} bytes");
            write_reply(&mut tx, &Reply::bad_request("line_too_long", message)).await?;
            break;
        }

        let reply = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(&gateway, line).await,
            Err(e) => Reply::bad_request("bad_command", format!("invalid utf-8: {e}")),
        };
        write_reply(&mut tx, &reply).await?;
    }

    Ok(())
}

async fn write_reply<W: AsyncWrite + Unpin>(tx: &mut W, reply: &Reply) -> io::Result<()> {
    let mut buf = serde_json::to_vec(reply)?;
    buf.push(b'\n');
    tx.write_all(&buf).await?;
    tx.flush().await
}

/// Accepts connections forever, serving each one on its own task.
pub async fn serve<S: ArtifactStore + 'static>(
    listener: TcpListener,
    gateway: Gateway<S>,
) -> io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("client connected from {addr}");

        let gateway = gateway.clone();
        tokio::spawn(async move {
            let (rx, tx) = stream.into_split();
            match serve_connection(gateway, rx, tx).await {
                Ok(()) => info!("client {addr} disconnected"),
                Err(e) => warn!("connection with {addr} failed: {e}"),
            }
        });
    }
}
