//! MCP protocol types and message definitions.
//!
//! Only the client side of the subset the hub speaks is modelled here:
//! the `initialize` handshake, `tools/list` and `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};

/// JSON-RPC version.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version announced in `initialize`.
pub const MCP_VERSION: &str = "2024-11-05";

/// Fixed request ids. Exchanges on one connection are strictly sequential,
/// so ids never need to disambiguate concurrent requests.
pub mod request_ids {
    pub const INITIALIZE: i64 = 0;
    pub const LIST_TOOLS: i64 = 1;
    pub const CALL_TOOL: i64 = 2;
}

/// Method names.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const LIST_TOOLS: &str = "tools/list";
    pub const CALL_TOOL: &str = "tools/call";
}

// ===== JSON-RPC Base Types =====

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Number(id),
            method: method.to_string(),
            params,
        }
    }

    /// The `initialize` request opening every connection.
    pub fn initialize(client_info: &ClientInfo) -> Self {
        let params = InitializeParams {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: client_info.clone(),
        };
        // InitializeParams only holds strings and maps, serialization cannot fail.
        let params = serde_json::to_value(params).unwrap_or_else(|_| json!({}));
        Self::new(request_ids::INITIALIZE, methods::INITIALIZE, Some(params))
    }

    /// A `tools/list` request with empty params.
    pub fn list_tools() -> Self {
        Self::new(request_ids::LIST_TOOLS, methods::LIST_TOOLS, Some(json!({})))
    }

    /// A `tools/call` request.
    pub fn call_tool(name: &str, arguments: Map<String, Value>) -> Self {
        Self::new(
            request_ids::CALL_TOOL,
            methods::CALL_TOOL,
            Some(json!({
                "name": name,
                "arguments": arguments,
            })),
        )
    }
}

/// A JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }

    /// The `notifications/initialized` notification completing the handshake.
    pub fn initialized() -> Self {
        Self::new(methods::INITIALIZED, None)
    }
}

/// Request ID (can be string or number).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

/// Whether a decoded JSON value is a JSON-RPC message.
///
/// Anything carrying at least one of `jsonrpc`, `result` or `error` counts.
/// Servers that print JSON log records on stdout are filtered by this check.
pub fn is_jsonrpc_message(value: &Value) -> bool {
    value
        .as_object()
        .map(|obj| {
            obj.contains_key("jsonrpc") || obj.contains_key("result") || obj.contains_key("error")
        })
        .unwrap_or(false)
}

/// Turn a JSON-RPC response into its `result` payload.
///
/// An `error` member becomes [`Error::Protocol`] carrying the server's message,
/// a response with neither member is [`Error::UnexpectedResponse`].
pub fn into_result(mut response: Value) -> Result<Value> {
    if let Some(result) = response.get_mut("result") {
        return Ok(result.take());
    }
    if let Some(error) = response.get("error") {
        return Err(Error::protocol(error));
    }
    Err(Error::UnexpectedResponse(truncate(&response.to_string(), 200)))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ===== MCP-Specific Types =====

/// Client identity sent in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Client capabilities. The hub only declares tool support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCapabilities {
    pub tools: Map<String, Value>,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self { tools: Map::new() }
    }
}

/// Initialize params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

/// Server info, when the server reports one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Initialize result. Every field is optional because some servers answer
/// the handshake with an empty object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Value>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

/// Content block in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType", alias = "mime_type")]
        mime_type: String,
    },
    Resource {
        resource: ResourceContent,
    },
}

/// Embedded resource content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}
