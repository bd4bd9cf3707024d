//! MCP Hub - client-side connection manager for Model Context Protocol servers.
//!
//! The hub spawns or dials MCP servers, performs the JSON-RPC handshake,
//! caches each server's tool list and forwards tool calls to the owning
//! server. Built-in tools and remote tools are exposed through one namespace.
//!
//! # Architecture
//!
//! 1. **Protocol Layer** (`mcp::protocol`, `mcp::framer`) - JSON-RPC messages
//!    and newline-delimited framing with noise tolerance
//! 2. **Transport Layer** (`mcp::transport`) - child processes over stdio,
//!    streamable HTTP and SSE endpoints
//! 3. **Connection Layer** (`mcp::connection`, `mcp::manager`) - lifecycle,
//!    tool caches and routing across servers
//! 4. **Tools Layer** (`tools`) - built-in tools and the unified tool service
//! 5. **Admin API** (`http`) - axum routes over the manager

pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod metrics;
pub mod tools;
pub mod types;

pub use error::{Error, Result};
pub use mcp::{ConnectionManager, ConnectionStatus, ManagerOptions};
pub use tools::ToolService;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
