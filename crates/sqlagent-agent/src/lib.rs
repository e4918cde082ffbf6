//! Agent implementations
//!
//! `LLMAgent` runs a bounded tool-calling loop against any `LLM`; the
//! `sql_agent` module wires it to a database with the fixed SQL prompt.

pub mod builder;
pub mod builder_common;
pub mod llm_agent;
pub mod sql_agent;
pub mod testing;

pub use builder::LLMAgentBuilder;
pub use llm_agent::LLMAgent;
pub use sql_agent::{
    final_answer, get_agent_response, init_agent, render_system_prompt, SingleTurnContext,
    SQL_AGENT_PROMPT,
};
