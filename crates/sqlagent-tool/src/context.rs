use sqlagent_core::ToolContext;

/// The model's tool call a tool execution answers
#[derive(Debug, Clone)]
pub struct CallContext {
    invocation_id: String,
    call_id: String,
}

impl CallContext {
    pub fn new(invocation_id: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            call_id: call_id.into(),
        }
    }
}

impl ToolContext for CallContext {
    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn call_id(&self) -> &str {
        &self.call_id
    }
}
