//! Unified tool descriptors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A tool in function-calling shape:
/// `{"type": "function", "function": {name, description, parameters}}`.
///
/// Remote tools also carry the id of the server that owns them. The tag is
/// serialized as `_server_id` for routing and stripped with
/// [`ToolDescriptor::without_owner`] before the list reaches a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
    #[serde(rename = "_server_id", default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

/// The callable part of a [`ToolDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    json!({})
}

impl ToolDescriptor {
    /// A function tool with no owner.
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            server_id: None,
        }
    }

    /// Normalize a tool as listed by an MCP server.
    ///
    /// Accepts either the MCP shape (`name`, `description`, `inputSchema`, or
    /// `parameters` as a fallback) or an already normalized descriptor.
    /// Returns `None` for anything else.
    pub fn from_mcp(tool: &Value, server_id: &str) -> Option<Self> {
        let obj = tool.as_object()?;

        let mut descriptor = if obj.contains_key("type") && obj.contains_key("function") {
            serde_json::from_value::<ToolDescriptor>(tool.clone()).ok()?
        } else {
            let name = obj.get("name")?.as_str()?;
            let description = obj
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let parameters = [obj.get("inputSchema"), obj.get("parameters")]
                .into_iter()
                .flatten()
                .find(|schema| !is_empty_schema(schema))
                .cloned()
                .unwrap_or_else(empty_object);
            Self::function(name, description, parameters)
        };

        descriptor.server_id = Some(server_id.to_string());
        Some(descriptor)
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// The same descriptor without the owning-server tag.
    pub fn without_owner(&self) -> Self {
        Self {
            server_id: None,
            ..self.clone()
        }
    }
}

fn is_empty_schema(schema: &Value) -> bool {
    match schema {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mcp_shape() {
        let tool = json!({
            "name": "echo",
            "description": "Echoes input",
            "inputSchema": {"type": "object"}
        });

        let descriptor = ToolDescriptor::from_mcp(&tool, "srv").unwrap();
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({
                "type": "function",
                "function": {
                    "name": "echo",
                    "description": "Echoes input",
                    "parameters": {"type": "object"}
                },
                "_server_id": "srv"
            })
        );
    }

    #[test]
    fn test_parameters_fallback_and_defaults() {
        let tool = json!({"name": "t", "inputSchema": {}, "parameters": {"type": "object"}});
        let descriptor = ToolDescriptor::from_mcp(&tool, "srv").unwrap();
        assert_eq!(descriptor.function.parameters, json!({"type": "object"}));

        let bare = ToolDescriptor::from_mcp(&json!({"name": "bare"}), "srv").unwrap();
        assert_eq!(bare.function.description, "");
        assert_eq!(bare.function.parameters, json!({}));
    }

    #[test]
    fn test_already_normalized_is_kept() {
        let tool = json!({
            "type": "function",
            "function": {"name": "search", "description": "Find", "parameters": {"type": "object"}}
        });
        let descriptor = ToolDescriptor::from_mcp(&tool, "srv").unwrap();
        assert_eq!(descriptor.name(), "search");
        assert_eq!(descriptor.server_id.as_deref(), Some("srv"));
    }

    #[test]
    fn test_malformed_tools_rejected() {
        assert!(ToolDescriptor::from_mcp(&json!("echo"), "srv").is_none());
        assert!(ToolDescriptor::from_mcp(&json!({"description": "nameless"}), "srv").is_none());
        assert!(ToolDescriptor::from_mcp(&json!({"name": 42}), "srv").is_none());
        assert!(ToolDescriptor::from_mcp(&json!({"type": "function", "function": {}}), "srv").is_none());
    }

    #[test]
    fn test_without_owner_drops_tag() {
        let descriptor = ToolDescriptor::from_mcp(&json!({"name": "echo"}), "srv").unwrap();
        let value = serde_json::to_value(descriptor.without_owner()).unwrap();
        assert!(value.get("_server_id").is_none());
    }
}
