//! Per-server configuration.
//!
//! Server entries arrive as loosely typed records (from a servers file or an
//! API request body). They are resolved once, at deserialization time, into
//! [`ServerConfig`], and only the enum is passed around afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::mcp::transport::TransportKind;

/// How to reach one MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawServerConfig", into = "RawServerConfig")]
pub enum ServerConfig {
    /// Spawn a child process and speak over its standard streams.
    Process(ProcessConfig),
    /// POST JSON-RPC messages to an HTTP endpoint.
    Network(NetworkConfig),
}

/// Child-process server settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub url: String,
    pub prefer_sse: bool,
    /// Overrides the manager's handshake and tool timeouts for this server.
    pub timeout_ms: Option<u64>,
}

impl ServerConfig {
    /// Shorthand for a process config.
    pub fn process<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Process(ProcessConfig {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        })
    }

    /// Shorthand for a network config.
    pub fn network(url: impl Into<String>) -> Self {
        Self::Network(NetworkConfig {
            url: url.into(),
            ..Default::default()
        })
    }

    /// Reject configs that cannot possibly be connected. Performs no I/O.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Process(p) if p.command.trim().is_empty() => {
                Err(Error::Config("process server requires a non-empty `command`".to_string()))
            }
            Self::Network(n) if n.url.trim().is_empty() => {
                Err(Error::Config("network server requires a non-empty `url`".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// The transport this config selects.
    pub fn transport_kind(&self) -> TransportKind {
        match self {
            Self::Process(_) => TransportKind::Stdio,
            Self::Network(n) if n.prefer_sse || n.url.trim_end_matches('/').ends_with("/sse") => {
                TransportKind::Sse
            }
            Self::Network(_) => TransportKind::StreamableHttp,
        }
    }
}

/// Wire shape of a server entry. Presence of `command` selects a process
/// server; otherwise `url` is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub prefer_sse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TryFrom<RawServerConfig> for ServerConfig {
    type Error = Error;

    fn try_from(raw: RawServerConfig) -> Result<Self> {
        let config = match (raw.command, raw.url) {
            (Some(command), _) => Self::Process(ProcessConfig {
                command,
                args: raw.args,
                env: raw.env,
            }),
            (None, Some(url)) => Self::Network(NetworkConfig {
                url,
                prefer_sse: raw.prefer_sse,
                timeout_ms: raw.timeout_ms,
            }),
            (None, None) => {
                return Err(Error::Config(
                    "server config requires either `command` or `url`".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<ServerConfig> for RawServerConfig {
    fn from(config: ServerConfig) -> Self {
        match config {
            ServerConfig::Process(p) => Self {
                command: Some(p.command),
                args: p.args,
                env: p.env,
                ..Default::default()
            },
            ServerConfig::Network(n) => Self {
                url: Some(n.url),
                prefer_sse: n.prefer_sse,
                timeout_ms: n.timeout_ms,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServersFile {
    #[serde(rename = "mcpServers", alias = "mcp_servers", default)]
    servers: BTreeMap<String, ServerConfig>,
}

/// Load `{"mcpServers": {"<id>": {...}}}` from a JSON or YAML file.
pub fn load_servers_file(path: &Path) -> Result<BTreeMap<String, ServerConfig>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read servers file {}: {}", path.display(), e))
    })?;
    parse_servers(&contents, is_yaml(path))
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn parse_servers(contents: &str, yaml: bool) -> Result<BTreeMap<String, ServerConfig>> {
    let file: ServersFile = if yaml {
        serde_yaml::from_str(contents)?
    } else {
        serde_json::from_str(contents)?
    };
    Ok(file.servers)
}
