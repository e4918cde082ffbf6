//! Session management
//!
//! A session is an ordered event log plus a JSON state map. Events carry
//! `state_delta`s that are folded into the state when they are appended;
//! the chat transcript is derived from the log.

use async_trait::async_trait;
use sqlagent_core::{Content, Event, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub mod inmemory;
pub mod types;

pub use inmemory::InMemorySessionService;
pub use types::{
    ChatMessage, CreateRequest, GetRequest, InputFile, GREETING, STATE_INPUT_FILE, STATE_MODEL,
};

/// Session service trait
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn get(&self, req: &GetRequest) -> Result<Arc<dyn Session>>;
    async fn create(&self, req: &CreateRequest) -> Result<Arc<dyn Session>>;
    /// Append `event` and apply its state delta
    async fn append_event(&self, session_id: &str, event: Event) -> Result<()>;
    async fn delete(&self, session_id: &str) -> Result<()>;
}

/// Session trait
pub trait Session: Send + Sync {
    fn id(&self) -> &str;
    fn app_name(&self) -> &str;
    fn user_id(&self) -> &str;
    fn events(&self) -> Vec<Event>;
    fn state(&self) -> HashMap<String, serde_json::Value>;

    /// Chat transcript: the greeting, then user messages and final model text
    fn messages(&self) -> Vec<ChatMessage> {
        transcript(&self.events())
    }

    /// Dataset recorded under `input_file`, if any
    fn input_file(&self) -> Option<InputFile> {
        self.state()
            .get(STATE_INPUT_FILE)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Model recorded under `model`, if any
    fn selected_model(&self) -> Option<String> {
        self.state()
            .get(STATE_MODEL)
            .and_then(|v| v.as_str().map(str::to_string))
    }
}

/// Build the transcript for an event log
pub fn transcript(events: &[Event]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::assistant(GREETING)];

    for event in events.iter().filter(|e| !e.partial) {
        let Some(content) = &event.content else {
            continue;
        };
        let Some(text) = content.text() else {
            continue;
        };
        match content.role.as_str() {
            Content::ROLE_USER => messages.push(ChatMessage::user(text)),
            Content::ROLE_MODEL if content.function_calls().is_empty() => {
                messages.push(ChatMessage::assistant(text))
            }
            _ => {}
        }
    }

    messages
}

/// Event that only changes session state
pub fn state_update_event(
    author: impl Into<String>,
    delta: HashMap<String, serde_json::Value>,
) -> Event {
    let mut event = Event::new(uuid::Uuid::new_v4().to_string(), author.into());
    event.actions.state_delta = delta;
    event
}
