use crate::builder_common::AgentBuilderCore;
use crate::llm_agent::LLMAgent;
use sqlagent_core::{Error, GenerateConfig, LLM, Result, Tool};
use std::sync::Arc;

/// Default bound on model round trips per invocation
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

pub struct LLMAgentBuilder {
    core: AgentBuilderCore,
    model: Option<Arc<dyn LLM>>,
    system_instruction: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    generate_config: Option<GenerateConfig>,
    max_iterations: usize,
    stream: bool,
}

impl LLMAgentBuilder {
    pub fn new() -> Self {
        Self {
            core: AgentBuilderCore::new(),
            model: None,
            system_instruction: None,
            tools: Vec::new(),
            generate_config: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stream: true,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.core.with_name(name);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.core.with_description(description);
        self
    }

    pub fn model(mut self, model: Arc<dyn LLM>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Add a tool; a tool with the same name replaces the earlier one
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
        self
    }

    pub fn tools(self, tools: Vec<Arc<dyn Tool>>) -> Self {
        tools.into_iter().fold(self, |builder, tool| builder.tool(tool))
    }

    pub fn generate_config(mut self, config: GenerateConfig) -> Self {
        self.generate_config = Some(config);
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Whether model output is requested as a stream (default: true)
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn build(self) -> Result<LLMAgent> {
        let (name, description) = self.core.validate("LLMAgent", "An LLM-powered agent")?;
        let model = self
            .model
            .ok_or_else(|| Error::Config("LLMAgent model is required".to_string()))?;
        if self.max_iterations == 0 {
            return Err(Error::Config(
                "LLMAgent max_iterations must be at least 1".to_string(),
            ));
        }

        Ok(LLMAgent {
            name,
            description,
            model,
            system_instruction: self.system_instruction,
            tools: self.tools,
            generate_config: self.generate_config,
            max_iterations: self.max_iterations,
            stream: self.stream,
        })
    }
}

impl Default for LLMAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
