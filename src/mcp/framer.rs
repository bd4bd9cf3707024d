//! Newline-delimited JSON-RPC framing.
//!
//! MCP servers speaking over standard streams emit one JSON object per line,
//! but many of them also print banners, progress lines or structured log
//! records to the same stream. The reader here skips that noise until a
//! JSON-RPC message shows up or the read budget runs out.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::mcp::protocol::{is_jsonrpc_message, JsonRpcRequest, RequestId};

/// Maximum number of lines inspected while looking for one response.
pub const MAX_READ_ATTEMPTS: usize = 10;

/// Serialize `message` as compact JSON, terminate it with a newline and flush.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    trace!("Sending: {}", String::from_utf8_lossy(&bytes).trim_end());
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Maximum number of abandoned request ids remembered per channel.
const MAX_LATE_RESPONSES: usize = 16;

/// Read lines until the response to `expected` shows up.
///
/// Each line read is bounded by `per_read`. A timeout or end of stream on the
/// first read fails immediately; on a later read it ends the search, which
/// then reports [`Error::NoResponse`]. At most `max_attempts` lines are
/// inspected, blank lines included.
///
/// JSON-RPC messages carrying another id are skipped like noise. `late`
/// holds ids of earlier requests that were given up on; the first response
/// carrying such an id is consumed and discarded, so a server that answers
/// in order cannot hand a stale result to a later request. An error response
/// without an id is taken as the answer.
pub async fn read_response<R>(
    reader: &mut R,
    expected: &RequestId,
    late: &mut Vec<RequestId>,
    per_read: Duration,
    operation: &str,
    max_attempts: usize,
) -> Result<Value>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    for attempt in 0..max_attempts {
        buf.clear();
        match timeout(per_read, reader.read_until(b'\n', &mut buf)).await {
            Err(_) if attempt == 0 => {
                return Err(Error::Timeout {
                    operation: operation.to_string(),
                    millis: per_read.as_millis() as u64,
                });
            }
            Err(_) => {
                debug!("Timed out waiting for more output during {}", operation);
                break;
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(0)) if attempt == 0 => {
                return Err(Error::Transport(format!(
                    "server closed its output stream during {}",
                    operation
                )));
            }
            Ok(Ok(0)) => {
                debug!("End of stream while reading {} response", operation);
                break;
            }
            Ok(Ok(_)) => {}
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value = match serde_json::from_str::<Value>(line) {
            Ok(value) if is_jsonrpc_message(&value) => value,
            Ok(_) => {
                debug!("Skipping non-JSON-RPC output: {}", line);
                continue;
            }
            Err(_) => {
                debug!("Skipping non-JSON output: {}", line);
                continue;
            }
        };

        match response_id(&value) {
            Some(id) => {
                if let Some(pos) = late.iter().position(|l| *l == id) {
                    late.remove(pos);
                    debug!("Discarding late response to request {:?} during {}", id, operation);
                } else if id == *expected {
                    trace!("Received: {}", line);
                    return Ok(value);
                } else {
                    debug!("Skipping response to request {:?} during {}", id, operation);
                }
            }
            None if value.get("error").is_some() && value.get("method").is_none() => {
                trace!("Received: {}", line);
                return Ok(value);
            }
            None => debug!("Skipping server message during {}: {}", operation, line),
        }
    }

    Err(Error::NoResponse(operation.to_string()))
}

fn response_id(value: &Value) -> Option<RequestId> {
    value
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

struct Inbound<R> {
    reader: R,
    /// Requests whose exchange ended without their response.
    late: Vec<RequestId>,
}

/// A request/response channel over a pair of byte streams.
///
/// The reader lock is the read-serialization guard: an exchange holds it from
/// before its request is written until its response has been read, so two
/// concurrent exchanges can never consume each other's lines. The writer has
/// its own lock so notifications and whole-line writes stay atomic.
pub struct FramedChannel<R, W> {
    inbound: Mutex<Inbound<R>>,
    writer: Mutex<Option<W>>,
}

impl<R, W> FramedChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            inbound: Mutex::new(Inbound {
                reader,
                late: Vec::new(),
            }),
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Send one request and wait for its response.
    ///
    /// When no response arrives in time the request id is remembered, and
    /// its response is dropped if it turns up during a later exchange.
    pub async fn exchange(
        &self,
        request: &JsonRpcRequest,
        per_read: Duration,
        operation: &str,
    ) -> Result<Value> {
        let mut inbound = self.inbound.lock().await;
        self.send(request).await?;

        let Inbound { reader, late } = &mut *inbound;
        let result = read_response(
            reader,
            &request.id,
            late,
            per_read,
            operation,
            MAX_READ_ATTEMPTS,
        )
        .await;
        if matches!(result, Err(Error::Timeout { .. }) | Err(Error::NoResponse(_))) {
            if late.len() >= MAX_LATE_RESPONSES {
                late.remove(0);
            }
            late.push(request.id.clone());
        }
        result
    }

    /// Write one message without waiting for anything back.
    pub async fn send<T>(&self, message: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| Error::Transport("input stream already closed".to_string()))?;
        write_message(writer, message).await
    }

    /// Drop the write half, signalling end of input to the peer.
    pub async fn close_writer(&self) {
        let mut writer = self.writer.lock().await;
        if let Some(mut w) = writer.take() {
            let _ = w.shutdown().await;
        }
    }
}
