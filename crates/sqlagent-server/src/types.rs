use serde::{Deserialize, Serialize};
use sqlagent_session::{ChatMessage, InputFile};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
    pub input_file: Option<InputFile>,
    pub model: Option<String>,
    /// Which database the agent is working on, once a file is uploaded
    pub banner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    pub models: Vec<String>,
    pub default_model: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadQuery {
    /// `csv` or `sqlite`
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub input_file: InputFile,
    pub tables: Vec<String>,
    pub rows: Option<u64>,
    pub fallback: bool,
    pub banner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,
    /// Model id or selection label; defaults to the session's model
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub model: String,
    /// Set when the agent failed; `reply` then carries the user-facing message
    pub error: Option<String>,
}

/// Banner text shown once a dataset is loaded
pub fn banner(file_name: &str) -> String {
    format!("The Agent is currently working on {} database.", file_name)
}
