//! MCP Hub - connect to MCP servers and expose their tools through one API.

use clap::Parser;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mcp_hub::config::{Args, Config};
use mcp_hub::error::{Error, Result};
use mcp_hub::http::{self, AppState};
use mcp_hub::mcp::ConnectionManager;
use mcp_hub::tools::{register_builtin_tools, LocalToolRegistry, ToolService};
use mcp_hub::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config: Config = args.into();

    init_logging(&config)?;

    info!("MCP Hub v{}", VERSION);
    info!("Workspace: {:?}", config.workspace);

    let servers = config.load_servers()?;
    info!("Loaded {} MCP server definitions", servers.len());

    let manager = Arc::new(ConnectionManager::with_servers(
        config.manager_options(),
        servers.clone(),
    ));

    if config.connect_on_start {
        connect_all(&manager, servers).await;
    }

    let mut local = LocalToolRegistry::new();
    register_builtin_tools(&mut local, &config.workspace);
    let service = Arc::new(ToolService::new(local, manager.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let state = AppState::new(service).with_cors_origins(&config.cors_origins);
    http::serve(listener, state, shutdown_signal()).await?;

    info!("Shutting down MCP connections...");
    manager.shutdown().await;
    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Internal(format!("Failed to set tracing subscriber: {}", e)))
}

async fn connect_all(
    manager: &ConnectionManager,
    servers: impl IntoIterator<Item = (String, mcp_hub::config::ServerConfig)>,
) {
    let attempts = servers.into_iter().map(|(id, config)| async move {
        match manager.connect(&id, config).await {
            Ok(()) => info!("Connected to MCP server '{}'", id),
            Err(e) => warn!("Failed to connect to MCP server '{}': {}", id, e),
        }
    });
    join_all(attempts).await;
    info!(
        "{} of {} MCP servers connected",
        manager.connected_count().await,
        manager.list_servers().await.len()
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
