//! Line-delimited JSON-RPC over TCP exposing `Agent.Query`.
//!
//! One request object per line:
//! `{"method":"Agent.Query","params":[{"query":"why is the database slow?"}],"id":1}`.
//! The reply is one line `{"id":1,"result":{...},"error":null}`. `params` may
//! also be the request object itself. Requests on one connection are served
//! in order; each connection runs on its own task.

use crate::service::DiagnosticService;
use crate::types::QueryRequest;
use anyhow::{Context, Result};
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const QUERY_METHOD: &str = "Agent.Query";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Longest accepted request line, in bytes.
pub const MAX_REQUEST_LINE: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Value,
    pub result: Value,
    pub error: Option<String>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    fn err(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Accept connections until `cancel` fires, then give open connections a
/// short grace period to wind down.
pub async fn serve(
    listener: TcpListener,
    service: DiagnosticService,
    cancel: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr().context("Failed to read listener address")?;
    info!("JSON-RPC server listening on {}", local);

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("Connection from {}", peer);
                        let service = service.clone();
                        let cancel = cancel.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, service, cancel).await {
                                warn!("Connection {} closed with error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                }
            }
            // Reap finished connection tasks so the set does not grow.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = cancel.cancelled() => break,
        }
    }

    info!("JSON-RPC server shutting down ({} open connections)", connections.len());
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("Aborting connections still open after shutdown grace period");
        connections.abort_all();
    }
    Ok(())
}

/// One framed request line, or the reason it was rejected before decoding.
#[derive(Debug, PartialEq)]
enum Frame {
    Line(String),
    Rejected(String),
}

/// Newline framing that reports oversized and non-UTF-8 lines as frames, so
/// the connection survives them and the caller still gets a reply.
struct RequestCodec {
    lines: LinesCodec,
}

impl RequestCodec {
    fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_REQUEST_LINE),
        }
    }

    fn classify(
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Frame>, LinesCodecError> {
        match decoded {
            Ok(line) => Ok(line.map(Frame::Line)),
            // The inner codec discards the rest of the line and carries on.
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Rejected(format!(
                "request line exceeds {} bytes",
                MAX_REQUEST_LINE
            )))),
            // The offending line is already consumed from the buffer.
            Err(LinesCodecError::Io(e)) if e.kind() == ErrorKind::InvalidData => {
                Ok(Some(Frame::Rejected("request is not valid UTF-8".into())))
            }
            Err(e) => Err(e),
        }
    }
}

impl Decoder for RequestCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::classify(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::classify(self.lines.decode_eof(buf))
    }
}

/// Serve one connection. An in-flight query is dropped, with nothing written
/// back, when the server shuts down or the peer resets the connection.
async fn handle_connection(
    stream: TcpStream,
    service: DiagnosticService,
    cancel: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut frames = FramedRead::new(reader, RequestCodec::new());
    let mut queued: VecDeque<Frame> = VecDeque::new();
    let mut read_closed = false;

    loop {
        let frame = match queued.pop_front() {
            Some(frame) => frame,
            None if read_closed => return Ok(()),
            None => tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = frames.next() => match next {
                    Some(frame) => frame?,
                    None => return Ok(()),
                },
            },
        };

        let reply = match frame {
            Frame::Line(line) if line.trim().is_empty() => continue,
            Frame::Rejected(reason) => {
                warn!("Rejected request line: {}", reason);
                RpcResponse::err(Value::Null, format!("invalid request: {}", reason))
            }
            Frame::Line(line) => {
                let pending = handle_line(&service, &line);
                tokio::pin!(pending);
                loop {
                    tokio::select! {
                        reply = &mut pending => break reply,
                        _ = cancel.cancelled() => {
                            info!("Dropping in-flight request on shutdown");
                            return Ok(());
                        }
                        next = frames.next(), if !read_closed => match next {
                            Some(Ok(frame)) => queued.push_back(frame),
                            // Half-close: the peer may still be waiting for the reply.
                            None => read_closed = true,
                            Some(Err(e)) => {
                                info!("Peer disconnected, dropping in-flight request: {}", e);
                                return Ok(());
                            }
                        },
                    }
                }
            }
        };

        let mut encoded = serde_json::to_vec(&reply).context("Failed to encode RPC response")?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
}

/// Decode one request line and dispatch it.
pub async fn handle_line(service: &DiagnosticService, line: &str) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return RpcResponse::err(Value::Null, format!("invalid request: {}", e)),
    };

    if request.method != QUERY_METHOD {
        return RpcResponse::err(
            request.id,
            format!("rpc: can't find method {}", request.method),
        );
    }

    let query = match decode_query(request.params) {
        Ok(query) => query,
        Err(e) => return RpcResponse::err(request.id, format!("invalid params: {}", e)),
    };

    match service.query(query).await {
        Ok(response) => match serde_json::to_value(response) {
            Ok(result) => RpcResponse::ok(request.id, result),
            Err(e) => RpcResponse::err(request.id, format!("failed to encode response: {}", e)),
        },
        Err(e) => RpcResponse::err(request.id, e.to_string()),
    }
}

/// `params` is either `[request]` or the request object itself.
fn decode_query(params: Value) -> Result<QueryRequest, serde_json::Error> {
    let params = match params {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    serde_json::from_value(params)
}
