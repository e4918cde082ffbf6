use super::types::*;
use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use sqlagent_core::{Content, Error, FunctionCall, LLM, LLMRequest, LLMResponse, Part, Result};
use std::collections::BTreeMap;

/// Groq's OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Chat model speaking the OpenAI chat-completions protocol, tool calls included
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
    temperature: Option<f32>,
}

impl OpenAIModel {
    pub fn new(api_key: String, model_name: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Temperature used when a request carries no generation config
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build the wire request for an `LLMRequest`
    pub fn build_request(&self, request: LLMRequest, stream: bool) -> OpenAIRequest {
        let config = request.config.unwrap_or_default();
        let tools: Vec<OpenAITool> = request
            .tools
            .into_iter()
            .map(|declaration| OpenAITool {
                tool_type: "function".to_string(),
                function: OpenAIFunctionDef {
                    name: declaration.name,
                    description: declaration.description,
                    parameters: declaration.parameters,
                },
            })
            .collect();
        let tool_choice = if tools.is_empty() {
            None
        } else {
            Some("auto".to_string())
        };

        OpenAIRequest {
            model: self.model_name.clone(),
            messages: Self::convert_contents_to_messages(
                request.system_instruction,
                request.contents,
            ),
            temperature: config.temperature.or(self.temperature),
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            stream: Some(stream),
            tools,
            tool_choice,
        }
    }

    /// Convert conversation contents to chat messages
    ///
    /// Model turns become `assistant` messages carrying `tool_calls`; each
    /// function response becomes a `tool` message answering its call id.
    pub fn convert_contents_to_messages(
        system_instruction: Option<String>,
        contents: Vec<Content>,
    ) -> Vec<OpenAIMessage> {
        let mut messages = Vec::with_capacity(contents.len() + 1);

        if let Some(system) = system_instruction.filter(|s| !s.is_empty()) {
            messages.push(OpenAIMessage::text("system", system));
        }

        for content in contents {
            match content.role.as_str() {
                "model" => {
                    let tool_calls: Vec<OpenAIToolCall> = content
                        .function_calls()
                        .into_iter()
                        .map(|call| OpenAIToolCall {
                            id: call_id(&call),
                            call_type: "function".to_string(),
                            function: OpenAIFunctionCall {
                                name: call.name,
                                arguments: call.args.to_string(),
                            },
                        })
                        .collect();

                    let text = content.text();
                    if tool_calls.is_empty() {
                        messages.push(OpenAIMessage::text("assistant", text.unwrap_or_default()));
                    } else {
                        messages.push(OpenAIMessage {
                            role: "assistant".to_string(),
                            content: text,
                            tool_calls: Some(tool_calls),
                            tool_call_id: None,
                        });
                    }
                }
                "function" => {
                    for part in content.parts {
                        if let Part::FunctionResponse { function_response } = part {
                            let body = match function_response.response {
                                serde_json::Value::String(s) => s,
                                other => other.to_string(),
                            };
                            let id = function_response
                                .id
                                .unwrap_or_else(|| fallback_call_id(&function_response.name));
                            messages.push(OpenAIMessage {
                                role: "tool".to_string(),
                                content: Some(body),
                                tool_calls: None,
                                tool_call_id: Some(id),
                            });
                        }
                    }
                }
                role => {
                    let role = if role == "system" { "system" } else { "user" };
                    messages.push(OpenAIMessage::text(role, content.text().unwrap_or_default()));
                }
            }
        }

        messages
    }

    /// Convert an assistant message to model content
    pub fn convert_message_to_content(message: &OpenAIMessage) -> Content {
        let mut parts = Vec::new();

        if let Some(text) = message.content.as_ref().filter(|t| !t.is_empty()) {
            parts.push(Part::Text { text: text.clone() });
        }

        for call in message.tool_calls.iter().flatten() {
            parts.push(Part::FunctionCall {
                function_call: FunctionCall {
                    name: call.function.name.clone(),
                    args: parse_arguments(&call.function.arguments),
                    id: Some(call.id.clone()).filter(|id| !id.is_empty()),
                },
            });
        }

        Content {
            role: Content::ROLE_MODEL.to_string(),
            parts,
        }
    }
}

fn call_id(call: &FunctionCall) -> String {
    call.id
        .clone()
        .unwrap_or_else(|| fallback_call_id(&call.name))
}

fn fallback_call_id(name: &str) -> String {
    format!("call_{}", name)
}

/// Arguments arrive JSON-encoded; unparseable input is handed to the tool as a raw string
fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(arguments)
        .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()))
}

async fn post_chat(
    client: &Client,
    url: &str,
    api_key: &str,
    body: &OpenAIRequest,
) -> Result<reqwest::Response> {
    let resp = client
        .post(url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| Error::LLMError(format!("Request failed: {}", e)))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let error_text = resp.text().await.unwrap_or_default();
        return Err(Error::LLMError(format!(
            "API error {}: {}",
            status, error_text
        )));
    }

    Ok(resp)
}

/// Splits a server-sent-event byte stream into `data:` payloads.
/// Lines may be cut anywhere between chunks.
#[derive(Debug, Default)]
struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\n', '\r']);
    line.strip_prefix("data:")
        .map(|data| data.trim_start().to_string())
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Joins streamed tool-call fragments by their index
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    fn apply(&mut self, deltas: &[OpenAIToolCallDelta]) {
        for delta in deltas {
            let entry = self.calls.entry(delta.index).or_default();
            if let Some(id) = &delta.id {
                entry.id = Some(id.clone());
            }
            if let Some(function) = &delta.function {
                if let Some(name) = &function.name {
                    entry.name.push_str(name);
                }
                if let Some(arguments) = &function.arguments {
                    entry.arguments.push_str(arguments);
                }
            }
        }
    }

    fn into_parts(self) -> Vec<Part> {
        self.calls
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| Part::FunctionCall {
                function_call: FunctionCall {
                    args: parse_arguments(&call.arguments),
                    id: call.id.filter(|id| !id.is_empty()),
                    name: call.name,
                },
            })
            .collect()
    }
}

/// State of one streamed assistant turn
#[derive(Debug, Default)]
struct StreamedTurn {
    text: String,
    tool_calls: ToolCallAccumulator,
    finish_reason: Option<String>,
}

impl StreamedTurn {
    /// Apply one SSE payload, returning any new text
    fn consume(&mut self, payload: &str) -> Option<String> {
        if payload == "[DONE]" {
            return None;
        }

        let chunk = match serde_json::from_str::<OpenAIStreamResponse>(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparseable stream chunk");
                return None;
            }
        };

        let choice = chunk.choices.into_iter().next()?;
        if let Some(deltas) = &choice.delta.tool_calls {
            self.tool_calls.apply(deltas);
        }
        if choice.finish_reason.is_some() {
            self.finish_reason = choice.finish_reason;
        }

        let text = choice.delta.content.filter(|t| !t.is_empty())?;
        self.text.push_str(&text);
        Some(text)
    }

    fn into_response(self) -> LLMResponse {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(Part::Text { text: self.text });
        }
        parts.extend(self.tool_calls.into_parts());

        LLMResponse {
            content: Some(Content {
                role: Content::ROLE_MODEL.to_string(),
                parts,
            }),
            partial: false,
            turn_complete: true,
            interrupted: false,
            finish_reason: self.finish_reason.or_else(|| Some("stop".to_string())),
            error_code: None,
            error_message: None,
        }
    }
}

fn partial_response(text: String) -> LLMResponse {
    LLMResponse {
        content: Some(Content::new_model_text(text)),
        partial: true,
        turn_complete: false,
        interrupted: false,
        finish_reason: None,
        error_code: None,
        error_message: None,
    }
}

#[async_trait]
impl LLM for OpenAIModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn generate_content(
        &self,
        request: LLMRequest,
        do_stream: bool,
    ) -> Box<dyn Stream<Item = Result<LLMResponse>> + Send + Unpin> {
        let url = self.build_url();
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let openai_req = self.build_request(request, do_stream);

        tracing::debug!(
            model = %openai_req.model,
            messages = openai_req.messages.len(),
            tools = openai_req.tools.len(),
            stream = do_stream,
            "Sending chat completion request"
        );

        if do_stream {
            Box::new(Box::pin(stream! {
                let resp = match post_chat(&client, &url, &api_key, &openai_req).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut bytes = resp.bytes_stream();
                let mut buffer = SseBuffer::default();
                let mut turn = StreamedTurn::default();

                while let Some(chunk) = bytes.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            yield Err(Error::LLMError(format!("Stream error: {}", e)));
                            return;
                        }
                    };
                    for payload in buffer.push(&chunk) {
                        if let Some(text) = turn.consume(&payload) {
                            yield Ok(partial_response(text));
                        }
                    }
                }
                if let Some(payload) = buffer.finish() {
                    if let Some(text) = turn.consume(&payload) {
                        yield Ok(partial_response(text));
                    }
                }

                yield Ok(turn.into_response());
            }))
        } else {
            Box::new(Box::pin(stream! {
                let resp = match post_chat(&client, &url, &api_key, &openai_req).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                match resp.json::<OpenAIResponse>().await {
                    Ok(openai_resp) => match openai_resp.choices.first() {
                        Some(choice) => {
                            yield Ok(LLMResponse {
                                content: Some(Self::convert_message_to_content(&choice.message)),
                                partial: false,
                                turn_complete: true,
                                interrupted: false,
                                finish_reason: choice.finish_reason.clone(),
                                error_code: None,
                                error_message: None,
                            });
                        }
                        None => {
                            yield Err(Error::LLMError("Response contained no choices".to_string()));
                        }
                    },
                    Err(e) => {
                        yield Err(Error::LLMError(format!("Failed to parse response: {}", e)));
                    }
                }
            }))
        }
    }
}
