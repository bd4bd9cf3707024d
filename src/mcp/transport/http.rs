//! HTTP transport: one POST per JSON-RPC message.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

use super::{Transport, TransportKind};
use crate::config::server::NetworkConfig;
use crate::error::{Error, Result};
use crate::mcp::protocol::{is_jsonrpc_message, JsonRpcNotification, JsonRpcRequest};

/// Normalize a server base URL to its `/messages` endpoint.
pub fn messages_endpoint(url: &str) -> String {
    if url.ends_with("/messages") {
        url.to_string()
    } else {
        format!("{}/messages", url.trim_end_matches('/'))
    }
}

/// An MCP server reached over HTTP.
///
/// The underlying client keeps a connection pool, so consecutive requests to
/// the same server reuse sockets. Nothing is sent until the first request.
pub struct HttpTransport {
    server_id: String,
    kind: TransportKind,
    endpoint: String,
    client: reqwest::Client,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(server_id: &str, config: &NetworkConfig, kind: TransportKind) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mcp-hub/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let endpoint = messages_endpoint(&config.url);
        debug!(server = server_id, "Using {} endpoint {}", kind, endpoint);

        Ok(Self {
            server_id: server_id.to_string(),
            kind,
            endpoint,
            client,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::Transport(format!(
                "HTTP transport for '{}' is closed",
                self.server_id
            )))
        } else {
            Ok(())
        }
    }

    async fn post(&self, body: &Value, timeout: Duration, operation: &str) -> Result<reqwest::Response> {
        trace!(server = %self.server_id, "POST {}: {}", self.endpoint, body);
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout, operation))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("HTTP error {}", status.as_u16())));
        }
        Ok(response)
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration, operation: &str) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            operation: operation.to_string(),
            millis: timeout.as_millis() as u64,
        }
    } else {
        Error::Http(err)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn request(&self, request: &JsonRpcRequest, timeout: Duration, operation: &str) -> Result<Value> {
        self.ensure_open()?;
        let body = serde_json::to_value(request)?;
        let response = self.post(&body, timeout, operation).await?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(e, timeout, operation))?;
        if !is_jsonrpc_message(&value) {
            return Err(Error::NoResponse(operation.to_string()));
        }
        Ok(value)
    }

    async fn notify(&self, notification: &JsonRpcNotification) -> Result<()> {
        self.ensure_open()?;
        let body = serde_json::to_value(notification)?;
        // Servers may answer a notification with 202 and no body.
        self.post(&body, Duration::from_secs(10), &notification.method)
            .await
            .map(|_| ())
    }

    async fn check_alive(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
