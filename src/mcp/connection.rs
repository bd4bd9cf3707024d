//! Per-server connection state machine.
//!
//! A [`ServerConnection`] moves between `disconnected`, `connecting` and
//! `connected`. It owns the transport while connecting or connected and
//! drives the MCP handshake and tool discovery over it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::server::ServerConfig;
use crate::error::{Error, Result};
use crate::mcp::manager::ManagerOptions;
use crate::mcp::protocol::{into_result, InitializeResult, JsonRpcNotification, JsonRpcRequest};
use crate::mcp::transport::{self, Transport, TransportKind};

/// Connection status of one server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// A status transition, broadcast to manager subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionEvent {
    pub server_id: String,
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of one registered server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub id: String,
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    pub config: ServerConfig,
    pub error: Option<String>,
    pub tool_count: usize,
    /// Set when the last tool refresh failed while the server stayed connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_error: Option<String>,
}

struct ConnectionState {
    config: ServerConfig,
    status: ConnectionStatus,
    transport: Option<Arc<dyn Transport>>,
    /// Bumped on every connect attempt so late refresh results from an older
    /// transport never land in the cache of a newer one.
    generation: u64,
    tools: Vec<Value>,
    /// Set once `tools` holds a successful listing for this generation, even
    /// an empty one.
    tools_fetched: bool,
    resources: Vec<Value>,
    prompts: Vec<Value>,
    error: Option<String>,
    tools_error: Option<String>,
}

/// One registered MCP server.
pub struct ServerConnection {
    id: String,
    options: Arc<ManagerOptions>,
    events: broadcast::Sender<ConnectionEvent>,
    state: RwLock<ConnectionState>,
    /// Serializes connect, disconnect and retire. Holds `true` once the entry
    /// has been removed from its manager.
    lifecycle: Mutex<bool>,
}

impl ServerConnection {
    pub(crate) fn new(
        id: &str,
        config: ServerConfig,
        options: Arc<ManagerOptions>,
        events: broadcast::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            id: id.to_string(),
            options,
            events,
            state: RwLock::new(ConnectionState {
                config,
                status: ConnectionStatus::Disconnected,
                transport: None,
                generation: 0,
                tools: Vec::new(),
                tools_fetched: false,
                resources: Vec::new(),
                prompts: Vec::new(),
                error: None,
                tools_error: None,
            }),
            lifecycle: Mutex::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    pub async fn config(&self) -> ServerConfig {
        self.state.read().await.config.clone()
    }

    pub async fn summary(&self) -> ServerSummary {
        let state = self.state.read().await;
        ServerSummary {
            id: self.id.clone(),
            status: state.status,
            transport: state.transport.as_ref().map(|t| t.kind()),
            config: state.config.clone(),
            error: state.error.clone(),
            tool_count: state.tools.len(),
            tools_error: state.tools_error.clone(),
        }
    }

    fn emit(&self, status: ConnectionStatus, error: Option<String>) {
        // No subscribers is fine.
        let _ = self.events.send(ConnectionEvent {
            server_id: self.id.clone(),
            status,
            error,
        });
    }

    /// Per-read timeouts for discovery and tool execution.
    fn timeouts(&self, config: &ServerConfig) -> (Duration, Duration) {
        match config {
            ServerConfig::Network(n) => match n.timeout_ms {
                Some(ms) => (Duration::from_millis(ms), Duration::from_millis(ms)),
                None => (self.options.handshake_timeout, self.options.tool_timeout),
            },
            ServerConfig::Process(_) => (self.options.handshake_timeout, self.options.tool_timeout),
        }
    }

    /// Connect using `config`, replacing the stored configuration.
    ///
    /// Fails with [`Error::AlreadyConnected`] if the server is connected. A
    /// failed tool discovery after the handshake does not fail the connect.
    pub async fn connect(&self, config: ServerConfig) -> Result<()> {
        let retired = self.lifecycle.lock().await;
        if *retired {
            return Err(Error::UnknownServer(self.id.clone()));
        }

        let generation = {
            let mut state = self.state.write().await;
            if state.status == ConnectionStatus::Connected {
                return Err(Error::AlreadyConnected(self.id.clone()));
            }
            state.config = config.clone();
            state.status = ConnectionStatus::Connecting;
            state.error = None;
            state.tools_error = None;
            state.tools_fetched = false;
            state.generation += 1;
            state.generation
        };
        self.emit(ConnectionStatus::Connecting, None);
        info!(server = %self.id, "Connecting to MCP server ({})", config.transport_kind());

        if let Err(e) = self.establish(&config).await {
            let transport = {
                let mut state = self.state.write().await;
                state.transport.take()
            };
            if let Some(transport) = transport {
                transport.close().await;
            }

            let message = e.to_string();
            {
                let mut state = self.state.write().await;
                state.status = ConnectionStatus::Disconnected;
                state.error = Some(message.clone());
            }
            error!(server = %self.id, "Failed to connect to MCP server: {}", message);
            self.emit(ConnectionStatus::Disconnected, Some(message));
            return Err(e);
        }

        {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Connected;
        }
        self.emit(ConnectionStatus::Connected, None);
        info!(server = %self.id, "Connected to MCP server");

        self.refresh_generation(generation).await;
        Ok(())
    }

    async fn establish(&self, config: &ServerConfig) -> Result<()> {
        let transport = transport::open(&self.id, config, self.options.shutdown_grace).await?;
        self.state.write().await.transport = Some(transport.clone());

        let (handshake_timeout, _) = self.timeouts(config);
        self.handshake(transport.as_ref(), handshake_timeout).await?;
        transport.check_alive().await
    }

    async fn handshake(&self, transport: &dyn Transport, timeout: Duration) -> Result<()> {
        let request = JsonRpcRequest::initialize(&self.options.client_info);
        let response = transport
            .request(&request, timeout, "initialization")
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;
        let result = into_result(response).map_err(|e| Error::Handshake(e.to_string()))?;

        let init: InitializeResult = serde_json::from_value(result).unwrap_or_default();
        if let Some(server) = init.server_info {
            info!(server = %self.id, "Server reports itself as {} {}", server.name, server.version);
        }
        if let Some(version) = init.protocol_version {
            debug!(server = %self.id, "Negotiated protocol version {}", version);
        }

        transport
            .notify(&JsonRpcNotification::initialized())
            .await
            .map_err(|e| Error::Handshake(format!("failed to send initialized notification: {}", e)))
    }

    /// Disconnect if connected. Otherwise a no-op.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.release().await;
    }

    /// Disconnect and refuse any later connect on this entry.
    pub(crate) async fn retire(&self) {
        let mut retired = self.lifecycle.lock().await;
        *retired = true;
        self.release().await;
    }

    async fn release(&self) {
        let transport = {
            let state = self.state.read().await;
            if state.status != ConnectionStatus::Connected {
                return;
            }
            state.transport.clone()
        };

        if let Some(transport) = transport {
            transport.close().await;
        }

        {
            let mut state = self.state.write().await;
            state.transport = None;
            state.status = ConnectionStatus::Disconnected;
            state.tools.clear();
            state.tools_fetched = false;
            state.resources.clear();
            state.prompts.clear();
            state.tools_error = None;
        }
        info!(server = %self.id, "Disconnected from MCP server");
        self.emit(ConnectionStatus::Disconnected, None);
    }

    /// Transport, discovery timeout, tool timeout and generation of the live
    /// connection.
    async fn live(&self) -> Result<(Arc<dyn Transport>, Duration, Duration, u64)> {
        let state = self.state.read().await;
        match (&state.status, &state.transport) {
            (ConnectionStatus::Connected, Some(transport)) => {
                let (discovery, tool) = self.timeouts(&state.config);
                Ok((transport.clone(), discovery, tool, state.generation))
            }
            (status, _) => Err(Error::NotConnected {
                id: self.id.clone(),
                status: status.to_string(),
            }),
        }
    }

    /// Re-fetch the tool list, replacing the cache wholesale.
    ///
    /// A failed fetch empties the cache and records the error in the summary;
    /// only a missing connection is reported as an error.
    pub async fn refresh_tools(&self) -> Result<()> {
        let (_, _, _, generation) = self.live().await?;
        self.refresh_generation(generation).await;
        Ok(())
    }

    async fn refresh_generation(&self, generation: u64) {
        let (transport, timeout, _, live_generation) = match self.live().await {
            Ok(live) => live,
            Err(_) => return,
        };
        if live_generation != generation {
            return;
        }

        let fetched = fetch_tools(transport.as_ref(), timeout).await;

        let mut state = self.state.write().await;
        if state.generation != generation || state.status != ConnectionStatus::Connected {
            debug!(server = %self.id, "Discarding tool list from a superseded connection");
            return;
        }
        match fetched {
            Ok(tools) => {
                info!(server = %self.id, "Discovered {} tools", tools.len());
                state.tools = tools;
                state.tools_fetched = true;
                state.tools_error = None;
            }
            Err(e) => {
                warn!(server = %self.id, "Failed to list tools: {}", e);
                state.tools.clear();
                state.tools_fetched = false;
                state.tools_error = Some(e.to_string());
            }
        }
    }

    /// Cached tool descriptors as the server sent them. Fetched first when
    /// `force_refresh` is set or no listing has succeeded on this connection.
    pub async fn list_tools(&self, force_refresh: bool) -> Result<Vec<Value>> {
        let (_, _, _, generation) = self.live().await?;
        let fetched = self.state.read().await.tools_fetched;
        if force_refresh || !fetched {
            self.refresh_generation(generation).await;
        }
        Ok(self.state.read().await.tools.clone())
    }

    pub async fn list_resources(&self) -> Result<Vec<Value>> {
        self.live().await?;
        Ok(self.state.read().await.resources.clone())
    }

    pub async fn list_prompts(&self) -> Result<Vec<Value>> {
        self.live().await?;
        Ok(self.state.read().await.prompts.clone())
    }

    /// Invoke a tool and return the `result` payload verbatim.
    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<Value> {
        let (transport, _, tool_timeout, _) = self.live().await?;
        debug!(server = %self.id, "Calling tool {}", name);
        let request = JsonRpcRequest::call_tool(name, arguments);
        let response = transport.request(&request, tool_timeout, "tool execution").await?;
        into_result(response)
    }
}

async fn fetch_tools(transport: &dyn Transport, timeout: Duration) -> Result<Vec<Value>> {
    let response = transport
        .request(&JsonRpcRequest::list_tools(), timeout, "tools/list")
        .await?;
    let result = into_result(response)?;
    match result.get("tools") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(tools)) => Ok(tools.clone()),
        Some(other) => Err(Error::UnexpectedResponse(format!(
            "`tools` is not an array: {}",
            other
        ))),
    }
}
