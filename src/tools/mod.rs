//! Tool orchestration.
//!
//! [`ToolService`] puts the built-in tools and the tools of every connected
//! MCP server behind one list and one `execute` call. Built-in tools win on
//! name clashes.
//!
//! - `registry` - local tool registry and the `ToolHandler` trait
//! - `builtin` - clock, calculator, weather and file tools
//! - `calc` - expression evaluator behind `calculate`

pub mod builtin;
pub mod calc;
pub mod registry;

pub use builtin::register_builtin_tools;
pub use registry::{LocalToolRegistry, ToolHandler};

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::mcp::manager::ConnectionManager;
use crate::mcp::protocol::ContentBlock;
use crate::types::ToolDescriptor;

/// Where a tool call was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "server_id", rename_all = "lowercase")]
pub enum ToolSource {
    Local,
    Remote(String),
}

/// Result of one tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub source: ToolSource,
    /// Built-in tools return their value; MCP servers return the raw
    /// `tools/call` result.
    pub value: Value,
    /// The server flagged the result with `isError`.
    pub is_error: bool,
}

impl ToolOutcome {
    fn new(tool: &str, source: ToolSource, value: Value) -> Self {
        let is_error = value
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            tool: tool.to_string(),
            source,
            value,
            is_error,
        }
    }

    /// Flatten the result into text for a tool-result message.
    ///
    /// MCP content blocks are joined line by line; anything else is rendered
    /// as JSON (strings without quotes).
    pub fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Object(obj) => match obj.get("content").and_then(Value::as_array) {
                Some(blocks) => blocks
                    .iter()
                    .map(render_block)
                    .collect::<Vec<_>>()
                    .join("\n"),
                None => self.value.to_string(),
            },
            other => other.to_string(),
        }
    }
}

fn render_block(block: &Value) -> String {
    match serde_json::from_value::<ContentBlock>(block.clone()) {
        Ok(ContentBlock::Text { text }) => text,
        Ok(ContentBlock::Image { mime_type, .. }) => format!("[image: {}]", mime_type),
        Ok(ContentBlock::Resource { resource }) => resource
            .text
            .unwrap_or_else(|| format!("[resource: {}]", resource.uri)),
        Err(_) => block.to_string(),
    }
}

/// One tool namespace over local and remote tools.
pub struct ToolService {
    local: LocalToolRegistry,
    manager: Arc<ConnectionManager>,
}

impl ToolService {
    pub fn new(local: LocalToolRegistry, manager: Arc<ConnectionManager>) -> Self {
        info!("Tool service ready with {} built-in tools", local.tool_count());
        Self { local, manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn local(&self) -> &LocalToolRegistry {
        &self.local
    }

    /// Built-in tools followed by remote tools from connected servers.
    ///
    /// A remote tool whose name is already taken, by a built-in or by an
    /// earlier server, is left out since calls by that name never reach it.
    /// Owner tags are stripped.
    pub async fn available_tools(&self, force_refresh: bool) -> Vec<ToolDescriptor> {
        let mut tools = self.local.schemas();
        let mut seen: HashSet<String> = tools.iter().map(|t| t.function.name.clone()).collect();

        for tool in self.manager.aggregated_tools(None, force_refresh).await {
            if seen.insert(tool.function.name.clone()) {
                tools.push(tool.without_owner());
            } else {
                debug!("Tool '{}' is shadowed and will not be listed", tool.name());
            }
        }
        tools
    }

    /// Run `name`: built-in first, then the first connected server exposing it.
    pub async fn execute(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutcome> {
        if self.local.has_tool(name) {
            let result = self.local.invoke(name, arguments).await;
            self.manager.metrics().record_local_call(result.is_ok());
            return result.map(|value| ToolOutcome::new(name, ToolSource::Local, value));
        }

        let server_id = self
            .manager
            .find_tool_owner(name)
            .await
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        debug!("Routing tool '{}' to server '{}'", name, server_id);

        let value = self.manager.execute_tool(&server_id, name, arguments).await?;
        Ok(ToolOutcome::new(name, ToolSource::Remote(server_id), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::manager::ManagerOptions;
    use serde_json::json;

    fn service() -> ToolService {
        let dir = std::env::temp_dir();
        let mut local = LocalToolRegistry::new();
        register_builtin_tools(&mut local, &dir);
        ToolService::new(local, Arc::new(ConnectionManager::new(ManagerOptions::default())))
    }

    #[tokio::test]
    async fn test_local_tool_executes_locally() {
        let service = service();
        let mut args = Map::new();
        args.insert("expression".to_string(), json!("2 + 2"));

        let outcome = service.execute("calculate", args).await.unwrap();
        assert_eq!(outcome.source, ToolSource::Local);
        assert_eq!(outcome.value, json!(4.0));
        assert_eq!(outcome.text(), "4.0");
        assert!(!outcome.is_error);
        assert_eq!(service.manager().metrics().snapshot().local_tool_calls, 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let err = service().execute("teleport", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(ref name) if name == "teleport"));
    }

    #[tokio::test]
    async fn test_available_tools_without_servers() {
        let tools = service().available_tools(false).await;
        assert_eq!(tools.len(), 6);
        assert!(tools.iter().all(|t| t.server_id.is_none()));
    }

    #[test]
    fn test_outcome_text_from_content_blocks() {
        let outcome = ToolOutcome::new(
            "fetch",
            ToolSource::Remote("web".to_string()),
            json!({
                "content": [
                    {"type": "text", "text": "line one"},
                    {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                    {"type": "resource", "resource": {"uri": "file:///a.txt"}},
                    {"type": "audio", "data": "BBBB"}
                ],
                "isError": true
            }),
        );

        assert!(outcome.is_error);
        assert_eq!(
            outcome.text(),
            "line one\n[image: image/png]\n[resource: file:///a.txt]\n{\"data\":\"BBBB\",\"type\":\"audio\"}"
        );
    }

    #[test]
    fn test_outcome_text_for_plain_values() {
        let string = ToolOutcome::new("t", ToolSource::Local, json!("hello"));
        assert_eq!(string.text(), "hello");

        let list = ToolOutcome::new("t", ToolSource::Local, json!(["a", "b"]));
        assert_eq!(list.text(), "[\"a\",\"b\"]");

        let object = ToolOutcome::new("t", ToolSource::Local, json!({"k": 1}));
        assert_eq!(object.text(), "{\"k\":1}");
    }

    #[test]
    fn test_source_serialization() {
        assert_eq!(serde_json::to_value(ToolSource::Local).unwrap(), json!({"kind": "local"}));
        assert_eq!(
            serde_json::to_value(ToolSource::Remote("fs".to_string())).unwrap(),
            json!({"kind": "remote", "server_id": "fs"})
        );
    }
}
