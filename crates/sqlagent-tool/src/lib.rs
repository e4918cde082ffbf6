//! Tool system
//!
//! This crate provides the tool execution framework:
//! - Function tools built from async closures
//! - A JSON schema builder for tool parameters
//! - The call context handed to a running tool

pub mod context;
pub mod function_tool;
pub mod schema;

// Re-exports
pub use context::CallContext;
pub use function_tool::{FunctionTool, FunctionToolBuilder};
pub use schema::ToolSchema;

// Re-export core types
pub use sqlagent_core::{Result, Tool, ToolContext, ToolResponse};
