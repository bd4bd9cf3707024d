//! Configuration management for the MCP hub.

pub mod server;

pub use server::{load_servers_file, NetworkConfig, ProcessConfig, ServerConfig};

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::mcp::manager::ManagerOptions;
use crate::mcp::protocol::ClientInfo;

/// Command-line arguments for the MCP hub.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-hub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Connect to MCP servers and expose their tools through one API")]
pub struct Args {
    /// JSON or YAML file with an `mcpServers` map
    #[arg(short, long, env = "MCP_HUB_SERVERS")]
    pub servers: Option<PathBuf>,

    /// Admin API bind host
    #[arg(long, default_value = "127.0.0.1", env = "MCP_HUB_HOST")]
    pub host: String,

    /// Admin API port
    #[arg(short, long, default_value = "8765", env = "MCP_HUB_PORT")]
    pub port: u16,

    /// Browser origin allowed to call the admin API (repeatable; none by default)
    #[arg(
        long = "cors-origin",
        value_name = "ORIGIN",
        env = "MCP_HUB_CORS_ORIGINS",
        value_delimiter = ','
    )]
    pub cors_origins: Vec<String>,

    /// Register configured servers without connecting at startup
    #[arg(long, env = "MCP_HUB_NO_CONNECT")]
    pub no_connect: bool,

    /// Per-read timeout for initialize and tools/list (milliseconds)
    #[arg(long, default_value = "5000", env = "MCP_HUB_HANDSHAKE_TIMEOUT_MS")]
    pub handshake_timeout_ms: u64,

    /// Per-read timeout for tools/call (milliseconds)
    #[arg(long, default_value = "30000", env = "MCP_HUB_TOOL_TIMEOUT_MS")]
    pub tool_timeout_ms: u64,

    /// Time a server process gets to exit before it is killed (milliseconds)
    #[arg(long, default_value = "5000", env = "MCP_HUB_SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: u64,

    /// Client name sent during the handshake
    #[arg(long, default_value = "omni-mcp-client", env = "MCP_HUB_CLIENT_NAME")]
    pub client_name: String,

    /// Client version sent during the handshake
    #[arg(long, default_value = "1.0.0", env = "MCP_HUB_CLIENT_VERSION")]
    pub client_version: String,

    /// Root directory for the built-in file tools
    #[arg(short, long, env = "WORKSPACE_PATH")]
    pub workspace: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "MCP_HUB_DEBUG")]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "MCP_HUB_JSON_LOGS")]
    pub json_logs: bool,
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Servers file, if any
    pub servers_file: Option<PathBuf>,
    /// Admin API bind host
    pub host: String,
    /// Admin API port
    pub port: u16,
    /// Origins granted cross-origin access to the admin API
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Connect configured servers at startup
    pub connect_on_start: bool,
    pub handshake_timeout_ms: u64,
    pub tool_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    pub client_name: String,
    pub client_version: String,
    /// Sandbox root for file tools
    pub workspace: PathBuf,
    /// Debug mode
    pub debug: bool,
    /// JSON log output
    pub json_logs: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            servers_file: args.servers,
            host: args.host,
            port: args.port,
            cors_origins: args.cors_origins,
            connect_on_start: !args.no_connect,
            handshake_timeout_ms: args.handshake_timeout_ms,
            tool_timeout_ms: args.tool_timeout_ms,
            shutdown_grace_ms: args.shutdown_grace_ms,
            client_name: args.client_name,
            client_version: args.client_version,
            workspace: args.workspace.unwrap_or_else(current_dir),
            debug: args.debug,
            json_logs: args.json_logs,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers_file: None,
            host: "127.0.0.1".to_string(),
            port: 8765,
            cors_origins: Vec::new(),
            connect_on_start: true,
            handshake_timeout_ms: 5000,
            tool_timeout_ms: 30000,
            shutdown_grace_ms: 5000,
            client_name: "omni-mcp-client".to_string(),
            client_version: "1.0.0".to_string(),
            workspace: current_dir(),
            debug: false,
            json_logs: false,
        }
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

impl Config {
    /// Options for the connection manager.
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            client_info: ClientInfo {
                name: self.client_name.clone(),
                version: self.client_version.clone(),
            },
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            tool_timeout: Duration::from_millis(self.tool_timeout_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }

    /// Servers from the configured file, or none.
    pub fn load_servers(&self) -> Result<BTreeMap<String, ServerConfig>> {
        match &self.servers_file {
            Some(path) => load_servers_file(path),
            None => Ok(BTreeMap::new()),
        }
    }

    /// `host:port` for the admin API listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert!(config.servers_file.is_none());
        assert_eq!(config.bind_addr(), "127.0.0.1:8765");
        assert!(config.connect_on_start);
        assert!(config.cors_origins.is_empty());
        assert!(!config.debug);
        assert!(!config.json_logs);
        assert_eq!(config.client_name, "omni-mcp-client");
    }

    #[test]
    fn test_args_parse_defaults() {
        let args = Args::try_parse_from(["mcp-hub"]).unwrap();
        let config: Config = args.into();

        assert_eq!(config.port, 8765);
        assert_eq!(config.handshake_timeout_ms, 5000);
        assert_eq!(config.tool_timeout_ms, 30000);
        assert!(config.connect_on_start);
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::try_parse_from([
            "mcp-hub",
            "--servers",
            "/etc/mcp/servers.yaml",
            "--port",
            "9000",
            "--no-connect",
            "--tool-timeout-ms",
            "60000",
            "--client-name",
            "my-agent",
            "--workspace",
            "/srv/work",
            "--debug",
        ])
        .unwrap();

        let config: Config = args.into();

        assert_eq!(config.servers_file, Some(PathBuf::from("/etc/mcp/servers.yaml")));
        assert_eq!(config.port, 9000);
        assert!(!config.connect_on_start);
        assert_eq!(config.workspace, PathBuf::from("/srv/work"));
        assert!(config.debug);

        let options = config.manager_options();
        assert_eq!(options.client_info.name, "my-agent");
        assert_eq!(options.tool_timeout, Duration::from_secs(60));
        assert_eq!(options.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_cors_origins_are_opt_in() {
        let args = Args::try_parse_from(["mcp-hub"]).unwrap();
        assert!(Config::from(args).cors_origins.is_empty());

        let args = Args::try_parse_from([
            "mcp-hub",
            "--cors-origin",
            "http://localhost:3000,https://console.example.com",
            "--cors-origin",
            "http://127.0.0.1:5173",
        ])
        .unwrap();
        let config: Config = args.into();
        assert_eq!(
            config.cors_origins,
            [
                "http://localhost:3000",
                "https://console.example.com",
                "http://127.0.0.1:5173"
            ]
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            port: 8080,
            debug: true,
            ..Config::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"port\":8080"));
        assert!(json.contains("\"debug\":true"));
    }

    #[test]
    fn test_load_servers_without_file() {
        assert!(Config::default().load_servers().unwrap().is_empty());
    }
}
