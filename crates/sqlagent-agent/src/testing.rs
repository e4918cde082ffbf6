//! Shared test utilities for agent testing
//!
//! Mock models and contexts reused by this crate's tests and by the crates
//! that drive agents (runner, server).

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::Stream;
use sqlagent_core::{
    Content, Error, FunctionCall, InvocationContext, LLM, LLMRequest, LLMResponse, Part, Result,
};
use std::collections::VecDeque;
use std::sync::Mutex;

fn final_response(content: Content) -> LLMResponse {
    LLMResponse {
        content: Some(content),
        partial: false,
        turn_complete: true,
        interrupted: false,
        finish_reason: Some("stop".to_string()),
        error_code: None,
        error_message: None,
    }
}

/// Mock LLM for testing
///
/// Returns the same text for any request.
pub struct MockLLM {
    response_text: String,
}

impl MockLLM {
    pub fn new() -> Self {
        Self {
            response_text: "Test response".to_string(),
        }
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response_text: response.into(),
        }
    }
}

impl Default for MockLLM {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLM for MockLLM {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_content(
        &self,
        _request: LLMRequest,
        _stream: bool,
    ) -> Box<dyn Stream<Item = Result<LLMResponse>> + Send + Unpin> {
        let response_text = self.response_text.clone();
        Box::new(Box::pin(stream! {
            yield Ok(final_response(Content::new_model_text(response_text)));
        }))
    }
}

/// LLM that plays back a script of model turns and records every request
pub struct ScriptedLLM {
    script: Mutex<VecDeque<Content>>,
    repeat: Option<Content>,
    requests: Mutex<Vec<LLMRequest>>,
    streaming: bool,
}

impl ScriptedLLM {
    pub fn new(turns: Vec<Content>) -> Self {
        Self {
            script: Mutex::new(turns.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            streaming: false,
        }
    }

    /// Answer every request with `turn`
    pub fn repeating(turn: Content) -> Self {
        Self {
            repeat: Some(turn),
            ..Self::new(Vec::new())
        }
    }

    /// Emit text word by word as partial responses before each final turn
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn text(text: impl Into<String>) -> Content {
        Content::new_model_text(text)
    }

    pub fn call(name: impl Into<String>, args: serde_json::Value) -> Content {
        Content {
            role: Content::ROLE_MODEL.to_string(),
            parts: vec![Part::FunctionCall {
                function_call: FunctionCall {
                    name: name.into(),
                    args,
                    id: None,
                },
            }],
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<LLMRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_turn(&self) -> Option<Content> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.or_else(|| self.repeat.clone())
    }
}

#[async_trait]
impl LLM for ScriptedLLM {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_content(
        &self,
        request: LLMRequest,
        _stream: bool,
    ) -> Box<dyn Stream<Item = Result<LLMResponse>> + Send + Unpin> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        let turn = self.next_turn();
        let streaming = self.streaming;

        Box::new(Box::pin(stream! {
            let Some(turn) = turn else {
                yield Err(Error::LLMError("script exhausted".to_string()));
                return;
            };

            if streaming {
                if let Some(text) = turn.text() {
                    let words: Vec<&str> = text.split_inclusive(' ').collect();
                    for word in words {
                        yield Ok(LLMResponse {
                            content: Some(Content::new_model_text(word)),
                            partial: true,
                            turn_complete: false,
                            interrupted: false,
                            finish_reason: None,
                            error_code: None,
                            error_message: None,
                        });
                    }
                }
            }

            yield Ok(final_response(turn));
        }))
    }
}

/// Invocation context carrying a single user message
pub struct TestContext {
    invocation_id: String,
    user_content: Content,
}

impl TestContext {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            invocation_id: "test-invocation".to_string(),
            user_content: Content::new_user_text(prompt),
        }
    }
}

impl InvocationContext for TestContext {
    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn session_id(&self) -> &str {
        "test-session"
    }

    fn user_content(&self) -> Option<&Content> {
        Some(&self.user_content)
    }
}
