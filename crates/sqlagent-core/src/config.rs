//! Configuration management
//!
//! Loads configuration with priority:
//! 1. config.toml (or specified config file)
//! 2. Environment variables, including a `.env` file (fallback)
//! 3. Defaults

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the model provider key
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

/// Model/LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider label, used in logs and model metadata
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (can reference env var with ${VAR_NAME})
    pub api_key: Option<String>,

    /// Model used when a request does not select one
    #[serde(default = "default_model_name")]
    pub default_model: String,

    /// Sampling temperature sent with every agent request
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where uploaded datasets are materialized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Database used when an upload has an unsupported extension
    #[serde(default = "default_database")]
    pub default_database: PathBuf,

    /// Table name CSV uploads are written to
    #[serde(default = "default_csv_table")]
    pub csv_table: String,

    /// Largest accepted upload request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Agent loop and tool limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Delay between words when replies are streamed back to a client
    #[serde(default = "default_stream_delay_ms")]
    pub stream_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            default_model: default_model_name(),
            temperature: default_temperature(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            default_database: default_database(),
            csv_table: default_csv_table(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_rows: default_max_rows(),
            query_timeout_secs: default_query_timeout_secs(),
            stream_delay_ms: default_stream_delay_ms(),
        }
    }
}

impl ModelConfig {
    /// Get API key with a clear error message
    pub fn api_key(&self) -> crate::Result<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                crate::Error::config_error(format!(
                    "{} environment variable is not set.",
                    API_KEY_ENV
                ))
            })
    }
}

impl AppConfig {
    /// Load configuration with the following priority:
    /// 1. config.toml in current directory or a parent
    /// 2. Environment variables (fallback)
    /// 3. Defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("No config.toml found, using defaults and environment");
                let mut config = Self::default();
                config.resolve_env_vars();
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        tracing::debug!("Loading configuration from: {:?}", path);

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse configuration text and resolve environment references
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(contents)?;
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Find config.toml by searching current directory and parents
    fn find_config_file() -> Option<PathBuf> {
        let mut current = env::current_dir().ok()?;

        loop {
            let config_path = current.join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            return Err(anyhow!("agent.max_iterations must be at least 1"));
        }
        if self.agent.max_rows == 0 {
            return Err(anyhow!("agent.max_rows must be at least 1"));
        }
        if self.storage.csv_table.trim().is_empty() {
            return Err(anyhow!("storage.csv_table must not be empty"));
        }
        Ok(())
    }

    /// Resolve ${VAR_NAME} references to environment variables
    fn resolve_env_vars(&mut self) {
        match self.model.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                self.model.api_key = Self::resolve_env_var(key);
            }
            _ => {
                self.model.api_key = env::var(API_KEY_ENV).ok();
            }
        }

        if let Some(resolved) = Self::resolve_env_var(&self.model.base_url) {
            self.model.base_url = resolved;
        }
    }

    /// Resolve a single ${VAR_NAME} reference
    fn resolve_env_var(value: &str) -> Option<String> {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            env::var(var_name).ok()
        } else {
            Some(value.to_string())
        }
    }

    /// Create test-friendly defaults (no API key lookup)
    pub fn test_defaults() -> Self {
        Self {
            model: ModelConfig {
                api_key: Some("test-api-key".to_string()),
                ..ModelConfig::default()
            },
            ..Self::default()
        }
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn default_provider() -> String {
    "groq".to_string()
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model_name() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.0)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets").join("db")
}

fn default_database() -> PathBuf {
    PathBuf::from("assets").join("db").join("Chinook.db")
}

fn default_csv_table() -> String {
    "data".to_string()
}

fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_rows() -> usize {
    1000
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_stream_delay_ms() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::test_defaults();
        assert_eq!(config.model.provider, "groq");
        assert_eq!(config.model.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.storage.csv_table, "data");
        assert_eq!(config.agent.max_iterations, 10);
        assert!(config.model.api_key().is_ok());
    }

    #[test]
    fn test_resolve_env_var() {
        unsafe {
            env::set_var("SQLAGENT_TEST_VAR", "test_value");
        }

        let resolved = AppConfig::resolve_env_var("${SQLAGENT_TEST_VAR}");
        assert_eq!(resolved, Some("test_value".to_string()));

        let not_var = AppConfig::resolve_env_var("plain_value");
        assert_eq!(not_var, Some("plain_value".to_string()));

        unsafe {
            env::remove_var("SQLAGENT_TEST_VAR");
        }
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [model]
            api_key = "literal-key"
            default_model = "gemma2-9b-it"

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.model.api_key.as_deref(), Some("literal-key"));
        assert_eq!(config.model.default_model, "gemma2-9b-it");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.assets_dir, PathBuf::from("assets").join("db"));
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let result = AppConfig::from_toml_str(
            r#"
            [model]
            api_key = "k"

            [agent]
            max_iterations = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_api_key_message() {
        let config = ModelConfig::default();
        let err = config.api_key().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: GROQ_API_KEY environment variable is not set."
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[model]\napi_key = \"file-key\"\n[storage]\ncsv_table = \"rows\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.storage.csv_table, "rows");
        assert_eq!(config.storage.max_upload_bytes, 200 * 1024 * 1024);
        assert_eq!(config.model.temperature, Some(0.0));

        let config = AppConfig::from_toml_str("[model]\napi_key = \"k\"\ntemperature = 0.7\n").unwrap();
        assert_eq!(config.model.temperature, Some(0.7));
    }
}
