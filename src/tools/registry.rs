//! In-process tool registry.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::ToolDescriptor;

/// A tool implemented inside the hub.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDescriptor;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value>;
}

/// Registry of local tool handlers, listed in registration order.
#[derive(Default)]
pub struct LocalToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl LocalToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler. A handler with the same name is replaced.
    pub fn register<T: ToolHandler + 'static>(&mut self, handler: T) {
        self.register_arc(Arc::new(handler));
    }

    /// Register a tool handler (Arc version).
    pub fn register_arc(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().function.name;
        if self.tools.insert(name.clone(), handler).is_none() {
            self.order.push(name);
        }
    }

    /// Descriptors of every registered tool.
    pub fn schemas(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|h| h.definition())
            .collect()
    }

    /// Get a tool by name.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Run a tool by name.
    ///
    /// Argument errors are returned as they are; any other failure is
    /// reported as [`Error::LocalTool`] naming the tool.
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<Value> {
        let handler = self
            .get_tool(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        handler.execute(arguments).await.map_err(|e| match e {
            Error::InvalidToolArguments(_) | Error::LocalTool { .. } => e,
            other => Error::LocalTool {
                name: name.to_string(),
                message: other.to_string(),
            },
        })
    }
}

/// Helper to extract a required string argument.
pub fn get_string_arg(args: &Map<String, Value>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| Error::InvalidToolArguments(format!("Missing required argument: {}", name)))
}

/// Helper to extract an optional string argument.
pub fn get_optional_string_arg(args: &Map<String, Value>, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(String::from)
}
