//! # Telemetry
//!
//! Structured logging and OpenTelemetry tracing for model calls and tool
//! executions. Span attributes follow the OpenTelemetry semantic conventions
//! for generative AI so traces line up with other gen-ai tooling.

mod spans;
mod tracer;

pub use spans::{
    LLMSpanAttributes, ToolSpanAttributes, safe_serialize, trace_llm_call, trace_tool_call,
};
pub use tracer::{LogFormat, init_telemetry, init_telemetry_with, tracer_provider};

/// OpenTelemetry span attribute constants
pub mod attributes {
    // Generic AI attributes
    pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";
    pub const GEN_AI_SYSTEM: &str = "gen_ai.system";
    pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";
    pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";
    pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";

    // Tool-specific attributes
    pub const GEN_AI_TOOL_NAME: &str = "gen_ai.tool.name";
    pub const GEN_AI_TOOL_CALL_ID: &str = "gen_ai.tool.call.id";

    // Agent attributes
    pub const SQLAGENT_INVOCATION_ID: &str = "sqlagent.invocation_id";
    pub const SQLAGENT_SESSION_ID: &str = "sqlagent.session_id";
    pub const SQLAGENT_EVENT_ID: &str = "sqlagent.event_id";
    pub const SQLAGENT_LLM_REQUEST: &str = "sqlagent.llm_request";
    pub const SQLAGENT_LLM_RESPONSE: &str = "sqlagent.llm_response";
    pub const SQLAGENT_TOOL_CALL_ARGS: &str = "sqlagent.tool_call_args";
    pub const SQLAGENT_TOOL_RESPONSE: &str = "sqlagent.tool_response";

    // System name constant
    pub const SYSTEM_NAME: &str = "sqlagent";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_constants() {
        assert_eq!(attributes::GEN_AI_OPERATION_NAME, "gen_ai.operation.name");
        assert_eq!(attributes::GEN_AI_SYSTEM, "gen_ai.system");
        assert_eq!(attributes::SYSTEM_NAME, "sqlagent");
    }
}
