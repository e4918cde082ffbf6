//! Span creation helpers for LLM calls and tool executions

use crate::attributes::*;

/// Attributes for tracing an LLM call
#[derive(Debug, Clone)]
pub struct LLMSpanAttributes {
    pub model: String,
    pub invocation_id: String,
    pub session_id: String,
    pub event_id: String,
    pub request_json: String,
    pub response_json: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
}

/// Attributes for tracing a tool call
#[derive(Debug, Clone)]
pub struct ToolSpanAttributes {
    pub tool_name: String,
    pub tool_call_id: String,
    pub invocation_id: String,
    pub session_id: String,
    pub args_json: String,
    pub response_json: String,
}

/// Record a span for one model round trip.
pub fn trace_llm_call(attrs: LLMSpanAttributes) {
    let span = tracing::info_span!(
        "call_llm",
        { GEN_AI_SYSTEM } = SYSTEM_NAME,
        { GEN_AI_REQUEST_MODEL } = %attrs.model,
        { SQLAGENT_INVOCATION_ID } = %attrs.invocation_id,
        { SQLAGENT_SESSION_ID } = %attrs.session_id,
        { SQLAGENT_EVENT_ID } = %attrs.event_id,
        { SQLAGENT_LLM_REQUEST } = %attrs.request_json,
        { SQLAGENT_LLM_RESPONSE } = %attrs.response_json,
        { GEN_AI_REQUEST_TEMPERATURE } = tracing::field::Empty,
        { GEN_AI_REQUEST_MAX_TOKENS } = tracing::field::Empty,
    );

    if let Some(temperature) = attrs.temperature {
        span.record(GEN_AI_REQUEST_TEMPERATURE, temperature);
    }
    if let Some(max_tokens) = attrs.max_tokens {
        span.record(GEN_AI_REQUEST_MAX_TOKENS, max_tokens);
    }

    let _guard = span.enter();
}

/// Record a span for one tool execution.
pub fn trace_tool_call(attrs: ToolSpanAttributes) {
    let span = tracing::info_span!(
        "execute_tool",
        { GEN_AI_OPERATION_NAME } = "execute_tool",
        { GEN_AI_TOOL_NAME } = %attrs.tool_name,
        { GEN_AI_TOOL_CALL_ID } = %attrs.tool_call_id,
        { SQLAGENT_INVOCATION_ID } = %attrs.invocation_id,
        { SQLAGENT_SESSION_ID } = %attrs.session_id,
        { SQLAGENT_TOOL_CALL_ARGS } = %attrs.args_json,
        { SQLAGENT_TOOL_RESPONSE } = %attrs.response_json,
    );

    let _guard = span.enter();
}

/// Helper to safely serialize to JSON string
pub fn safe_serialize<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<not serializable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_serialize() {
        let value = serde_json::json!({"query": "SELECT 1"});
        let result = safe_serialize(&value);
        assert!(result.contains("query"));
        assert!(result.contains("SELECT 1"));
    }

    #[test]
    fn test_llm_span_attributes() {
        let attrs = LLMSpanAttributes {
            model: "llama-3.3-70b-versatile".to_string(),
            invocation_id: "inv-123".to_string(),
            session_id: "sess-456".to_string(),
            event_id: "event-789".to_string(),
            request_json: "{}".to_string(),
            response_json: "{}".to_string(),
            temperature: Some(0.0),
            max_tokens: None,
        };

        trace_llm_call(attrs);
    }

    #[test]
    fn test_tool_span_attributes() {
        let attrs = ToolSpanAttributes {
            tool_name: "sql_db_query".to_string(),
            tool_call_id: "call-123".to_string(),
            invocation_id: "inv-123".to_string(),
            session_id: "sess-456".to_string(),
            args_json: r#"{"query": "SELECT 1"}"#.to_string(),
            response_json: r#"{"rows": [[1]]}"#.to_string(),
        };

        trace_tool_call(attrs);
    }
}
