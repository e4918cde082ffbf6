use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// State key holding the uploaded dataset (`InputFile`)
pub const STATE_INPUT_FILE: &str = "input_file";

/// State key holding the selected model id
pub const STATE_MODEL: &str = "model";

/// First assistant message of every chat
pub const GREETING: &str = "How can I assist you?";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub state: HashMap<String, serde_json::Value>,
}

/// Dataset the session is working on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFile {
    pub file_type: String,
    pub file_name: String,
    pub file_path: String,
}

/// One line of the chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub const ROLE_USER: &'static str = "user";
    pub const ROLE_ASSISTANT: &'static str = "assistant";

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Self::ROLE_USER.to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Self::ROLE_ASSISTANT.to_string(),
            content: content.into(),
        }
    }
}
