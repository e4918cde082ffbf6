use super::Content;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Event represents a single interaction in a conversation.
///
/// Each event captures a moment in the agent's execution flow: user messages,
/// model output, tool results and session state changes. Events are
/// JSON-serializable for streaming and storage, with camelCase field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub time: i64,
    pub invocation_id: String,
    pub author: String,
    pub partial: bool,
    pub turn_complete: bool,
    pub interrupted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error_code: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error_message: String,

    pub actions: EventActions,
}

impl Event {
    pub fn new(invocation_id: String, author: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            time: Utc::now().timestamp(),
            invocation_id,
            author,
            partial: false,
            turn_complete: false,
            interrupted: false,
            content: None,
            error_code: String::new(),
            error_message: String::new(),
            actions: EventActions::default(),
        }
    }

    pub fn is_final_response(&self) -> bool {
        !self.partial && self.turn_complete
    }

    /// Text of the event content if it is a model message
    pub fn model_text(&self) -> Option<String> {
        self.content
            .as_ref()
            .filter(|content| content.role == Content::ROLE_MODEL)
            .and_then(Content::text)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActions {
    #[serde(default)]
    pub state_delta: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_response() {
        let mut event = Event::new("inv-1".to_string(), "sql_agent".to_string());
        assert!(!event.is_final_response());

        event.turn_complete = true;
        assert!(event.is_final_response());

        event.partial = true;
        assert!(!event.is_final_response());
    }

    #[test]
    fn test_model_text_ignores_user_content() {
        let mut event = Event::new("inv-1".to_string(), "user".to_string());
        event.content = Some(Content::new_user_text("How many rows?"));
        assert_eq!(event.model_text(), None);

        event.content = Some(Content::new_model_text("42 rows"));
        assert_eq!(event.model_text().as_deref(), Some("42 rows"));
    }
}
