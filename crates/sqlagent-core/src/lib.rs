//! Core traits and types for the SQL chat agent
//!
//! This crate provides the shared abstractions every other crate builds on:
//! conversation content, events, the `Agent`/`LLM`/`Tool` traits, execution
//! contexts, errors and application configuration.

pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod event;
pub mod traits;

// Re-exports
pub use config::{AgentConfig, AppConfig, ModelConfig, ServerConfig, StorageConfig};
pub use content::{Content, FunctionCall, FunctionResponse, Part};
pub use context::{InvocationContext, ToolContext};
pub use error::{Error, Result};
pub use event::{Event, EventActions};
pub use traits::{
    Agent, GenerateConfig, LLM, LLMRequest, LLMResponse, Tool, ToolDeclaration, ToolResponse,
};
