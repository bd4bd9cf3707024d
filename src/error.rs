//! Error types for the MCP hub.

use thiserror::Error;

/// Result type alias for MCP hub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the MCP hub.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    // ===== Resolution Errors =====
    #[error("Command '{0}' not found in PATH. Make sure it's installed and available.")]
    CommandNotFound(String),

    #[error("Failed to start process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // ===== Handshake Errors =====
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Process exited with code {}", exit_code(.0))]
    ProcessExited(Option<i32>),

    // ===== Connection State Errors =====
    #[error("MCP server '{0}' is already connected")]
    AlreadyConnected(String),

    #[error("MCP server '{id}' is not connected (status: {status})")]
    NotConnected { id: String, status: String },

    // ===== Not-Found Errors =====
    #[error("Unknown MCP server: '{0}'")]
    UnknownServer(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // ===== Protocol Errors =====
    #[error("MCP server error: {message}")]
    Protocol { code: Option<i64>, message: String },

    #[error("Unexpected response format from server: {0}")]
    UnexpectedResponse(String),

    // ===== Transport Errors =====
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {operation} timed out after {millis} ms")]
    Timeout { operation: String, millis: u64 },

    #[error("Could not find valid JSON-RPC response from MCP server for {0}")]
    NoResponse(String),

    // ===== Local Tool Errors =====
    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    #[error("Error executing tool '{name}': {message}")]
    LocalTool { name: String, message: String },

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ===== HTTP Errors =====
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP server error: {0}")]
    HttpServer(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl Error {
    /// Build a protocol error from the `error` member of a JSON-RPC response.
    ///
    /// Servers do not always send a well-formed error object, so a bare string
    /// or any other value is stringified into the message.
    pub fn protocol(error: &serde_json::Value) -> Self {
        match error {
            serde_json::Value::Object(obj) => Self::Protocol {
                code: obj.get("code").and_then(|c| c.as_i64()),
                message: obj
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| error.to_string()),
            },
            serde_json::Value::String(s) => Self::Protocol {
                code: None,
                message: s.clone(),
            },
            other => Self::Protocol {
                code: None,
                message: other.to_string(),
            },
        }
    }

    /// The caller referenced something that does not exist (server or tool).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownServer(_) | Self::ToolNotFound(_))
    }

    /// The server was reachable but rejected the call.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::UnexpectedResponse(_))
    }

    /// The server could not be reached or stopped responding.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout { .. }
                | Self::NoResponse(_)
                | Self::ProcessExited(_)
                | Self::Io(_)
                | Self::Http(_)
        )
    }

    /// The request itself was wrong and retrying it unchanged cannot succeed.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::AlreadyConnected(_)
                | Self::NotConnected { .. }
                | Self::InvalidToolArguments(_)
        )
    }
}
