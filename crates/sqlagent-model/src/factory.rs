//! Model factory for creating LLM instances from configuration

use crate::openai::OpenAIModel;
use sqlagent_core::{Error, LLM, ModelConfig, Result};
use std::sync::Arc;

/// Supported LLM providers
///
/// Both speak the OpenAI chat-completions protocol; they differ only in
/// endpoint and key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Groq,
    OpenAI,
}

impl Provider {
    /// Parse provider from string
    ///
    /// # Example
    /// ```
    /// use sqlagent_model::Provider;
    ///
    /// let provider = Provider::from_str("groq").unwrap();
    /// assert_eq!(provider, Provider::Groq);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "openai" | "openai-compatible" => Ok(Provider::OpenAI),
            _ => Err(Error::config_error(format!("Unknown provider: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::OpenAI => "openai",
        }
    }
}

/// Instantiate the chat model named `model_name`
///
/// Names outside the static catalog are accepted; the provider rejects
/// models it does not serve.
pub fn init_llm(model_name: &str, config: &ModelConfig) -> Result<Arc<dyn LLM>> {
    let model_name = model_name.trim();
    if model_name.is_empty() {
        return Err(Error::config_error("Model name must not be empty"));
    }

    let provider = Provider::from_str(&config.provider)?;
    let api_key = config.api_key()?;

    tracing::info!(
        provider = provider.as_str(),
        model = model_name,
        "Initializing chat model"
    );

    let model = OpenAIModel::new(api_key, model_name.to_string())
        .with_base_url(config.base_url.clone())
        .with_temperature(config.temperature);

    Ok(Arc::new(model))
}
