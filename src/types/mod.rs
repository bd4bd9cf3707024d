//! Shared types.

pub mod tool;

pub use tool::{FunctionSpec, ToolDescriptor};
