//! MCP client transports.
//!
//! Two concrete channels share one contract: send a request and get back the
//! matching response within a timeout. The handshake itself is driven by the
//! connection layer, so opening a transport never talks MCP.

mod http;
mod process;

pub use http::{messages_endpoint, HttpTransport};
pub use process::{resolve_command, ProcessTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::server::ServerConfig;
use crate::error::Result;
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest};

/// Which concrete transport a connection is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Child process standard streams.
    Stdio,
    /// Request/response over HTTP POST.
    StreamableHttp,
    /// Server-push flavoured HTTP endpoint.
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::StreamableHttp => write!(f, "streamable-http"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

/// A live channel to one MCP server.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Send `request` and return the raw JSON-RPC response.
    ///
    /// `timeout` bounds each read; `operation` names the exchange in errors.
    async fn request(&self, request: &JsonRpcRequest, timeout: Duration, operation: &str) -> Result<Value>;

    /// Send a notification. No response is read.
    async fn notify(&self, notification: &JsonRpcNotification) -> Result<()>;

    /// Fail if the other end is known to be gone.
    async fn check_alive(&self) -> Result<()>;

    /// Release the underlying resources. Best effort and idempotent.
    async fn close(&self);
}

/// Open the transport selected by `config`.
pub async fn open(
    server_id: &str,
    config: &ServerConfig,
    shutdown_grace: Duration,
) -> Result<Arc<dyn Transport>> {
    match config {
        ServerConfig::Process(process) => Ok(Arc::new(ProcessTransport::spawn(
            server_id,
            process,
            shutdown_grace,
        )?)),
        ServerConfig::Network(network) => Ok(Arc::new(HttpTransport::new(
            server_id,
            network,
            config.transport_kind(),
        )?)),
    }
}
