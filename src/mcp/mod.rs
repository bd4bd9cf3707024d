//! Model Context Protocol (MCP) client.
//!
//! # Architecture
//!
//! - `protocol` - JSON-RPC / MCP message types and request builders
//! - `framer` - newline-delimited framing with noise filtering
//! - `transport` - child-process and HTTP channels
//! - `connection` - per-server state machine (handshake, tool discovery)
//! - `manager` - registry of connections, tool aggregation and routing

pub mod connection;
pub mod framer;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use connection::{ConnectionEvent, ConnectionStatus, ServerConnection, ServerSummary};
pub use manager::{ConnectionManager, ManagerOptions};
pub use transport::{Transport, TransportKind};
