use super::Content;

/// What an agent run knows about the turn it serves
pub trait InvocationContext: Send + Sync {
    fn invocation_id(&self) -> &str;

    /// Session the turn belongs to, used to tag spans
    fn session_id(&self) -> &str;

    /// The prompt that started the turn
    fn user_content(&self) -> Option<&Content>;
}

/// Identifies the tool call a tool is executing for
pub trait ToolContext: Send + Sync {
    fn invocation_id(&self) -> &str;
    fn call_id(&self) -> &str;
}
