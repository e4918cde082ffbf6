use crate::builder::LLMAgentBuilder;
use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use sqlagent_core::{
    Agent, Content, Error, Event, FunctionCall, FunctionResponse, GenerateConfig,
    InvocationContext, LLM, LLMRequest, Part, Result, Tool,
};
use sqlagent_telemetry::{
    safe_serialize, trace_llm_call, trace_tool_call, LLMSpanAttributes, ToolSpanAttributes,
};
use sqlagent_tool::CallContext;
use std::sync::Arc;

/// Agent that alternates between the model and its tools until the model
/// answers without requesting a tool
pub struct LLMAgent {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) model: Arc<dyn LLM>,
    pub(crate) system_instruction: Option<String>,
    pub(crate) tools: Vec<Arc<dyn Tool>>,
    pub(crate) generate_config: Option<GenerateConfig>,
    pub(crate) max_iterations: usize,
    pub(crate) stream: bool,
}

impl LLMAgent {
    pub fn builder() -> LLMAgentBuilder {
        LLMAgentBuilder::new()
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn model(&self) -> &Arc<dyn LLM> {
        &self.model
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

/// Run one tool call, turning failures into a response the model can read
async fn execute_call(
    tools: &[Arc<dyn Tool>],
    call: &FunctionCall,
    call_id: &str,
    invocation_id: &str,
) -> serde_json::Value {
    let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
        let available: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        tracing::warn!(
            invocation_id = %invocation_id,
            tool_name = %call.name,
            "Model requested an unknown tool"
        );
        return serde_json::json!({
            "error": format!(
                "Error: {} is not a valid tool, try one of [{}].",
                call.name,
                available.join(", ")
            )
        });
    };

    let tool_ctx = Arc::new(CallContext::new(invocation_id, call_id));

    match tool.execute(tool_ctx, call.args.clone()).await {
        Ok(response) => response.result,
        Err(e) => {
            tracing::warn!(
                invocation_id = %invocation_id,
                tool_name = %call.name,
                error = %e,
                "Tool execution failed"
            );
            serde_json::json!({
                "error": format!("Error: {}\n Please fix your mistakes.", e)
            })
        }
    }
}

#[async_trait]
impl Agent for LLMAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(
        &self,
        ctx: Arc<dyn InvocationContext>,
    ) -> Box<dyn Stream<Item = Result<Event>> + Send + Unpin> {
        let model = self.model.clone();
        let agent_name = self.name.clone();
        let system_instruction = self.system_instruction.clone();
        let tools = self.tools.clone();
        let generate_config = self.generate_config.clone();
        let max_iterations = self.max_iterations;
        let do_stream = self.stream;
        let invocation_id = ctx.invocation_id().to_string();
        let session_id = ctx.session_id().to_string();

        Box::new(Box::pin(stream! {
            let mut conversation: Vec<Content> = Vec::new();
            if let Some(user_content) = ctx.user_content() {
                conversation.push(user_content.clone());
            }
            let declarations: Vec<_> = tools.iter().map(|t| t.declaration()).collect();

            tracing::info!(
                invocation_id = %invocation_id,
                session_id = %session_id,
                agent = %agent_name,
                tools = declarations.len(),
                "Starting LLM agent execution"
            );

            for iteration in 0..max_iterations {
                let request = LLMRequest {
                    model: model.name().to_string(),
                    system_instruction: system_instruction.clone(),
                    contents: conversation.clone(),
                    config: generate_config.clone(),
                    tools: declarations.clone(),
                };

                tracing::debug!(
                    invocation_id = %invocation_id,
                    session_id = %session_id,
                    model = %request.model,
                    iteration,
                    "Calling LLM"
                );

                let request_json = serde_json::json!({
                    "model": request.model,
                    "contents": request.contents,
                    "tools": request.tools,
                });
                let temperature = request.config.as_ref().and_then(|c| c.temperature.map(f64::from));
                let max_tokens = request.config.as_ref().and_then(|c| c.max_tokens.map(i64::from));

                let mut llm_stream = model.generate_content(request, do_stream).await;
                let mut final_event: Option<Event> = None;

                while let Some(llm_result) = llm_stream.next().await {
                    let llm_response = match llm_result {
                        Ok(response) => response,
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                invocation_id = %invocation_id,
                                session_id = %session_id,
                                "LLM call failed"
                            );
                            yield Err(e);
                            return;
                        }
                    };

                    let mut event = Event::new(invocation_id.clone(), agent_name.clone());
                    event.content = llm_response.content;
                    event.partial = llm_response.partial;
                    event.turn_complete = llm_response.turn_complete;
                    event.interrupted = llm_response.interrupted;
                    if let Some(code) = llm_response.error_code {
                        event.error_code = code;
                    }
                    if let Some(msg) = llm_response.error_message {
                        event.error_message = msg;
                    }

                    if event.partial {
                        yield Ok(event);
                    } else {
                        final_event = Some(event);
                    }
                }

                let Some(mut model_event) = final_event else {
                    yield Err(Error::LLMError("Model returned no final response".to_string()));
                    return;
                };
                let mut content = model_event
                    .content
                    .take()
                    .unwrap_or_else(|| Content::new_model_text(""));

                // Calls without an id get one so responses can be matched
                for part in content.parts.iter_mut() {
                    if let Part::FunctionCall { function_call } = part {
                        if function_call.id.is_none() {
                            function_call.id = Some(uuid::Uuid::new_v4().to_string());
                        }
                    }
                }
                let function_calls = content.function_calls();

                trace_llm_call(LLMSpanAttributes {
                    model: model.name().to_string(),
                    invocation_id: invocation_id.clone(),
                    session_id: session_id.clone(),
                    event_id: model_event.id.clone(),
                    request_json: safe_serialize(&request_json),
                    response_json: safe_serialize(&content),
                    temperature,
                    max_tokens,
                });

                model_event.content = Some(content.clone());
                model_event.turn_complete = function_calls.is_empty();
                conversation.push(content);
                yield Ok(model_event);

                if function_calls.is_empty() {
                    tracing::info!(
                        invocation_id = %invocation_id,
                        session_id = %session_id,
                        iterations = iteration + 1,
                        "Agent execution completed"
                    );
                    return;
                }

                tracing::debug!(
                    invocation_id = %invocation_id,
                    session_id = %session_id,
                    num_function_calls = function_calls.len(),
                    "Executing function calls"
                );

                let mut function_responses = Vec::with_capacity(function_calls.len());
                for call in &function_calls {
                    let call_id = call.id.clone().unwrap_or_default();
                    let result = execute_call(&tools, call, &call_id, &invocation_id).await;

                    trace_tool_call(ToolSpanAttributes {
                        tool_name: call.name.clone(),
                        tool_call_id: call_id.clone(),
                        invocation_id: invocation_id.clone(),
                        session_id: session_id.clone(),
                        args_json: safe_serialize(&call.args),
                        response_json: safe_serialize(&result),
                    });

                    let part = Part::FunctionResponse {
                        function_response: FunctionResponse {
                            name: call.name.clone(),
                            response: result,
                            id: Some(call_id),
                        },
                    };

                    let mut tool_event = Event::new(invocation_id.clone(), agent_name.clone());
                    tool_event.content = Some(Content {
                        role: Content::ROLE_FUNCTION.to_string(),
                        parts: vec![part.clone()],
                    });
                    yield Ok(tool_event);

                    function_responses.push(part);
                }

                conversation.push(Content {
                    role: Content::ROLE_FUNCTION.to_string(),
                    parts: function_responses,
                });
            }

            tracing::error!(
                invocation_id = %invocation_id,
                session_id = %session_id,
                max_iterations,
                "Agent stopped with tool calls still pending"
            );
            yield Err(Error::message(format!(
                "Agent reached the limit of {} model calls without a final answer",
                max_iterations
            )));
        }))
    }
}
