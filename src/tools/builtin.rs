//! Built-in tools: clock, calculator, mock weather and sandboxed file access.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use crate::error::{Error, Result};
use crate::tools::calc;
use crate::tools::registry::{get_optional_string_arg, get_string_arg, LocalToolRegistry, ToolHandler};
use crate::types::ToolDescriptor;

/// Register every built-in tool. File tools are confined to `workspace`.
pub fn register_builtin_tools(registry: &mut LocalToolRegistry, workspace: &Path) {
    let sandbox = Arc::new(Sandbox::new(workspace));
    registry.register(CurrentTimeTool);
    registry.register(CalculateTool);
    registry.register(WeatherTool);
    registry.register(ReadFileTool::new(sandbox.clone()));
    registry.register(WriteFileTool::new(sandbox.clone()));
    registry.register(ListDirectoryTool::new(sandbox));
}

// ===== Workspace sandbox =====

/// Resolves tool-supplied paths and rejects anything outside the root.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(root: &Path) -> Self {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| absolute(root));
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` against the root. Relative paths are taken relative to
    /// the root. The longest existing prefix is canonicalized, so symlinks are
    /// followed wherever they exist, and only the components that do not exist
    /// yet are resolved lexically. The result must stay under the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        match real_path(&joined) {
            Some(resolved) if resolved.starts_with(&self.root) => Ok(resolved),
            _ => Err(Error::InvalidToolArguments(format!(
                "Access denied: {} is outside the workspace",
                path
            ))),
        }
    }
}

/// Canonicalize the longest existing prefix of `path` and append the rest.
///
/// Returns `None` when a missing component is nonetheless present as a
/// directory entry, which is a dangling symlink that writes would follow.
fn real_path(path: &Path) -> Option<PathBuf> {
    let components: Vec<Component> = path.components().collect();

    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        let Ok(mut resolved) = std::fs::canonicalize(&prefix) else {
            continue;
        };
        for component in &components[split..] {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                other => {
                    resolved.push(other.as_os_str());
                    if std::fs::symlink_metadata(&resolved).is_ok() {
                        return None;
                    }
                }
            }
        }
        return Some(resolved);
    }

    Some(normalize(path))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_default();
        normalize(&cwd.join(path))
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ===== Clock =====

/// Current local date and time.
pub struct CurrentTimeTool;

#[async_trait]
impl ToolHandler for CurrentTimeTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "get_current_time",
            "Get the current date and time",
            json!({
                "type": "object",
                "properties": {
                    "format": {
                        "type": "string",
                        "description": "Time format: 'iso', 'unix', or 'readable'",
                        "enum": ["iso", "unix", "readable"]
                    }
                }
            }),
        )
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let now = chrono::Local::now();
        let format = get_optional_string_arg(&args, "format").unwrap_or_default();
        let text = match format.as_str() {
            "iso" => now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        Ok(Value::String(text))
    }
}

// ===== Calculator =====

/// Arithmetic with common math functions.
pub struct CalculateTool;

#[async_trait]
impl ToolHandler for CalculateTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "calculate",
            "Perform mathematical calculations",
            json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Mathematical expression to evaluate (e.g., '2 + 2', 'sqrt(16)')"
                    }
                },
                "required": ["expression"]
            }),
        )
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let expression = get_string_arg(&args, "expression")?;
        let value = calc::evaluate(&expression)?;
        Ok(json!(value))
    }
}

// ===== Weather (mock) =====

/// Canned weather report. No network access.
pub struct WeatherTool;

#[async_trait]
impl ToolHandler for WeatherTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "get_weather",
            "Get weather information for a location",
            json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City name or location"
                    },
                    "units": {
                        "type": "string",
                        "description": "Temperature units: 'celsius' or 'fahrenheit'",
                        "enum": ["celsius", "fahrenheit"],
                        "default": "celsius"
                    }
                },
                "required": ["location"]
            }),
        )
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let location = get_string_arg(&args, "location")?;
        let temperature = match get_optional_string_arg(&args, "units").as_deref() {
            Some("fahrenheit") => "72°F",
            _ => "22°C",
        };
        Ok(Value::String(format!(
            "Weather in {}: {}, sunny (mock data)",
            location, temperature
        )))
    }
}

// ===== File tools =====

/// Read a UTF-8 file inside the workspace.
pub struct ReadFileTool {
    sandbox: Arc<Sandbox>,
}

impl ReadFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "read_file",
            "Read contents of a file",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to read"
                    }
                },
                "required": ["file_path"]
            }),
        )
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let path = self.sandbox.resolve(&get_string_arg(&args, "file_path")?)?;
        let contents = fs::read_to_string(&path).await?;
        Ok(Value::String(contents))
    }
}

/// Write a file inside the workspace, creating parent directories.
pub struct WriteFileTool {
    sandbox: Arc<Sandbox>,
}

impl WriteFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "write_file",
            "Write content to a file",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to write"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["file_path", "content"]
            }),
        )
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let requested = get_string_arg(&args, "file_path")?;
        let content = get_string_arg(&args, "content")?;
        let path = self.sandbox.resolve(&requested)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content.as_bytes()).await?;
        debug!("Wrote {} bytes to {}", content.len(), path.display());

        Ok(Value::String(format!(
            "Successfully wrote {} characters to {}",
            content.chars().count(),
            requested
        )))
    }
}

/// List entry names of a directory inside the workspace.
pub struct ListDirectoryTool {
    sandbox: Arc<Sandbox>,
}

impl ListDirectoryTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl ToolHandler for ListDirectoryTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "list_directory",
            "List files and directories in a path",
            json!({
                "type": "object",
                "properties": {
                    "directory_path": {
                        "type": "string",
                        "description": "Path to the directory to list"
                    }
                },
                "required": ["directory_path"]
            }),
        )
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let requested = get_string_arg(&args, "directory_path")?;
        let path = self.sandbox.resolve(&requested)?;
        if !fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(Error::InvalidToolArguments(format!(
                "Not a directory: {}",
                requested
            )));
        }

        let mut entries = fs::read_dir(&path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(json!(names))
    }
}
