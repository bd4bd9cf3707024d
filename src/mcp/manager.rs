//! Registry of MCP server connections.
//!
//! The [`ConnectionManager`] is constructed once by the host, shared behind an
//! `Arc`, and torn down with [`ConnectionManager::shutdown`]. Each server id
//! maps to one [`ServerConnection`]; operations on different ids never wait
//! on each other beyond the brief registry lock.

use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::server::ServerConfig;
use crate::error::{Error, Result};
use crate::mcp::connection::{ConnectionEvent, ConnectionStatus, ServerConnection, ServerSummary};
use crate::mcp::protocol::ClientInfo;
use crate::metrics::{Metrics, Timer};
use crate::types::ToolDescriptor;

const EVENT_CAPACITY: usize = 64;

/// Tunables shared by every connection of a manager.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Sent as `clientInfo` during the handshake.
    pub client_info: ClientInfo,
    /// Per-read timeout for `initialize` and `tools/list`.
    pub handshake_timeout: Duration,
    /// Per-read timeout for `tools/call`.
    pub tool_timeout: Duration,
    /// How long a child gets to exit after its stdin is closed.
    pub shutdown_grace: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            client_info: ClientInfo {
                name: "omni-mcp-client".to_string(),
                version: "1.0.0".to_string(),
            },
            handshake_timeout: Duration::from_secs(5),
            tool_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Registry of MCP servers keyed by id.
pub struct ConnectionManager {
    servers: RwLock<BTreeMap<String, Arc<ServerConnection>>>,
    options: Arc<ManagerOptions>,
    events: broadcast::Sender<ConnectionEvent>,
    metrics: Arc<Metrics>,
}

impl ConnectionManager {
    pub fn new(options: ManagerOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            servers: RwLock::new(BTreeMap::new()),
            options: Arc::new(options),
            events,
            metrics: Metrics::new(),
        }
    }

    /// A manager with `servers` registered but not connected.
    pub fn with_servers<I>(options: ManagerOptions, servers: I) -> Self
    where
        I: IntoIterator<Item = (String, ServerConfig)>,
    {
        let mut manager = Self::new(options);
        let registry = servers
            .into_iter()
            .map(|(id, config)| {
                let conn = manager.new_connection(&id, config);
                (id, conn)
            })
            .collect();
        manager.servers = RwLock::new(registry);
        manager
    }

    fn new_connection(&self, id: &str, config: ServerConfig) -> Arc<ServerConnection> {
        Arc::new(ServerConnection::new(
            id,
            config,
            self.options.clone(),
            self.events.clone(),
        ))
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Receive every status transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Registered server ids, sorted.
    pub async fn list_servers(&self) -> Vec<String> {
        self.servers.read().await.keys().cloned().collect()
    }

    pub async fn has_server(&self, id: &str) -> bool {
        self.servers.read().await.contains_key(id)
    }

    async fn get(&self, id: &str) -> Option<Arc<ServerConnection>> {
        self.servers.read().await.get(id).cloned()
    }

    async fn all(&self) -> Vec<Arc<ServerConnection>> {
        self.servers.read().await.values().cloned().collect()
    }

    /// Status of `id`, or `None` if it is not registered.
    pub async fn connection_status(&self, id: &str) -> Option<ConnectionStatus> {
        match self.get(id).await {
            Some(conn) => Some(conn.status().await),
            None => None,
        }
    }

    pub async fn server_config(&self, id: &str) -> Option<ServerConfig> {
        match self.get(id).await {
            Some(conn) => Some(conn.config().await),
            None => None,
        }
    }

    pub async fn summaries(&self) -> Vec<ServerSummary> {
        join_all(self.all().await.iter().map(|conn| conn.summary())).await
    }

    pub async fn summary(&self, id: &str) -> Option<ServerSummary> {
        match self.get(id).await {
            Some(conn) => Some(conn.summary().await),
            None => None,
        }
    }

    pub async fn connected_count(&self) -> usize {
        let statuses = join_all(self.all().await.iter().map(|conn| conn.status())).await;
        statuses
            .into_iter()
            .filter(|s| *s == ConnectionStatus::Connected)
            .count()
    }

    /// Connect `id` with `config`, registering it if needed.
    ///
    /// Registration is insert-if-absent: concurrent first connects on a new id
    /// share one entry and are serialized by it, so the loser sees
    /// [`Error::AlreadyConnected`] instead of replacing the winner.
    pub async fn connect(&self, id: &str, config: ServerConfig) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::Config("server id must not be empty".to_string()));
        }
        config.validate()?;

        let conn = {
            let mut servers = self.servers.write().await;
            servers
                .entry(id.to_string())
                .or_insert_with(|| self.new_connection(id, config.clone()))
                .clone()
        };

        self.metrics.inc_connect_attempts();
        let result = conn.connect(config).await;
        if result.is_err() {
            self.metrics.inc_connect_failures();
        }
        result
    }

    /// Disconnect `id`. Unknown or already disconnected ids are ignored.
    pub async fn disconnect(&self, id: &str) {
        if let Some(conn) = self.get(id).await {
            conn.disconnect().await;
        }
    }

    /// Disconnect and unregister `id`. Returns whether it was registered.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.servers.write().await.remove(id);
        match removed {
            Some(conn) => {
                conn.retire().await;
                info!(server = id, "Removed MCP server");
                true
            }
            None => false,
        }
    }

    /// The entry for `id` if it is connected.
    async fn ensure_connected(&self, id: &str) -> Result<Arc<ServerConnection>> {
        let conn = self
            .get(id)
            .await
            .ok_or_else(|| Error::UnknownServer(id.to_string()))?;
        match conn.status().await {
            ConnectionStatus::Connected => Ok(conn),
            status => Err(Error::NotConnected {
                id: id.to_string(),
                status: status.to_string(),
            }),
        }
    }

    /// Raw tool list of one server.
    pub async fn list_tools(&self, id: &str, force_refresh: bool) -> Result<Vec<Value>> {
        self.ensure_connected(id).await?.list_tools(force_refresh).await
    }

    pub async fn refresh_tools(&self, id: &str) -> Result<()> {
        self.ensure_connected(id).await?.refresh_tools().await
    }

    pub async fn list_resources(&self, id: &str) -> Result<Vec<Value>> {
        self.ensure_connected(id).await?.list_resources().await
    }

    pub async fn list_prompts(&self, id: &str) -> Result<Vec<Value>> {
        self.ensure_connected(id).await?.list_prompts().await
    }

    /// Connected entries, restricted to `ids` when given, in id order.
    async fn connected(&self, ids: Option<&[String]>) -> Vec<Arc<ServerConnection>> {
        let candidates = match ids {
            Some(ids) if !ids.is_empty() => {
                let servers = self.servers.read().await;
                ids.iter()
                    .filter_map(|id| {
                        let conn = servers.get(id).cloned();
                        if conn.is_none() {
                            debug!(server = %id, "Skipping unknown server");
                        }
                        conn
                    })
                    .collect()
            }
            _ => self.all().await,
        };

        let mut connected = Vec::with_capacity(candidates.len());
        for conn in candidates {
            if conn.status().await == ConnectionStatus::Connected {
                connected.push(conn);
            }
        }
        connected
    }

    /// Normalized tools of every connected server (or of the connected ones
    /// among `ids`), each tagged with its owner.
    ///
    /// Servers that are not connected contribute nothing. Malformed tool
    /// entries and servers whose listing fails are skipped with a warning.
    pub async fn aggregated_tools(&self, ids: Option<&[String]>, force_refresh: bool) -> Vec<ToolDescriptor> {
        let servers = self.connected(ids).await;
        let listings = join_all(servers.iter().map(|conn| async move {
            (conn.id().to_string(), conn.list_tools(force_refresh).await)
        }))
        .await;

        let mut tools = Vec::new();
        for (server_id, listing) in listings {
            match listing {
                Ok(raw) => tools.extend(normalize_tools(&server_id, &raw)),
                Err(e) => warn!(server = %server_id, "Skipping tools: {}", e),
            }
        }
        debug!("Collected {} tools from {} servers", tools.len(), servers.len());
        tools
    }

    /// Call `tool` on server `id` and return the `result` payload.
    ///
    /// Fails without any I/O when `id` is unknown or not connected.
    pub async fn execute_tool(&self, id: &str, tool: &str, arguments: Map<String, Value>) -> Result<Value> {
        let conn = self.ensure_connected(id).await?;
        let timer = Timer::start();
        let result = conn.call_tool(tool, arguments).await;
        self.metrics.record_remote_call(&timer, result.is_ok());
        if let Err(e) = &result {
            warn!(server = id, "Tool '{}' failed: {}", tool, e);
        }
        result
    }

    /// First connected server, in id order, whose tool list contains `tool`.
    pub async fn find_tool_owner(&self, tool: &str) -> Option<String> {
        for conn in self.connected(None).await {
            let Ok(raw) = conn.list_tools(false).await else {
                continue;
            };
            if normalize_tools(conn.id(), &raw).iter().any(|t| t.name() == tool) {
                return Some(conn.id().to_string());
            }
        }
        None
    }

    /// Disconnect every registered server concurrently.
    pub async fn disconnect_all(&self) {
        join_all(self.all().await.iter().map(|conn| conn.disconnect())).await;
    }

    /// Tear down: disconnect everything. Entries stay registered.
    pub async fn shutdown(&self) {
        info!("Shutting down MCP connection manager");
        self.disconnect_all().await;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ManagerOptions::default())
    }
}

fn normalize_tools(server_id: &str, raw: &[Value]) -> Vec<ToolDescriptor> {
    raw.iter()
        .filter_map(|tool| {
            let descriptor = ToolDescriptor::from_mcp(tool, server_id);
            if descriptor.is_none() {
                warn!(server = server_id, "Invalid tool format: {}", tool);
            }
            descriptor
        })
        .collect()
}
