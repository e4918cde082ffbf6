//! Model catalog
//!
//! The selectable models are an admin-maintained static list; the provider's
//! `/models` listing is available for discovery but includes non-chat models.

use super::types::OpenAIModelList;
use sqlagent_core::{Error, ModelConfig, Result};

/// Models offered for selection, in display order
pub const MODEL_LIST: &[&str] = &[
    "llama-3.1-8b-instant",
    "llama-3.3-70b-versatile",
    "meta-llama/llama-4-scout-17b-16e-instruct",
    "meta-llama/llama-4-maverick-17b-128e-instruct",
    "llama3-70b-8192",
    "llama3-8b-8192",
    "deepseek-r1-distill-qwen-32b",
    "deepseek-r1-distill-llama-70b",
    "gemma2-9b-it",
    "qwen-qwq-32b",
    "qwen-2.5-coder-32b",
    "qwen-2.5-32b",
];

pub fn get_llm_list() -> Vec<String> {
    MODEL_LIST.iter().map(|m| m.to_string()).collect()
}

/// Extract the model id from a selection label such as `"gemma2-9b-it FROM- Google"`
pub fn model_id_from_selection(selection: &str) -> &str {
    selection.split_whitespace().next().unwrap_or("")
}

/// Label format used for remotely discovered models
pub fn model_label(id: &str, owned_by: &str) -> String {
    format!("{} FROM- {}", id, owned_by)
}

/// Fetch the provider's model listing as sorted selection labels
pub async fn fetch_remote_models(config: &ModelConfig) -> Result<Vec<String>> {
    let api_key = config.api_key()?;
    let url = format!("{}/models", config.base_url.trim_end_matches('/'));

    let resp = reqwest::Client::new()
        .get(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .send()
        .await
        .map_err(|e| Error::LLMError(format!("Request failed: {}", e)))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let error_text = resp.text().await.unwrap_or_default();
        return Err(Error::LLMError(format!(
            "Model listing failed {}: {}",
            status, error_text
        )));
    }

    let listing: OpenAIModelList = resp
        .json()
        .await
        .map_err(|e| Error::LLMError(format!("Failed to parse model listing: {}", e)))?;

    let mut labels: Vec<String> = listing
        .data
        .iter()
        .map(|model| model_label(&model.id, &model.owned_by))
        .collect();
    labels.sort();

    tracing::debug!(count = labels.len(), "Fetched remote model listing");
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Json, Router};

    #[test]
    fn test_static_list() {
        let models = get_llm_list();
        assert_eq!(models.len(), 12);
        assert_eq!(models[0], "llama-3.1-8b-instant");
        assert_eq!(models[1], "llama-3.3-70b-versatile");
        assert_eq!(models[11], "qwen-2.5-32b");
    }

    #[test]
    fn test_model_id_from_selection() {
        assert_eq!(model_id_from_selection("gemma2-9b-it FROM- Google"), "gemma2-9b-it");
        assert_eq!(model_id_from_selection("qwen-qwq-32b"), "qwen-qwq-32b");
        assert_eq!(model_id_from_selection(""), "");
    }

    #[tokio::test]
    async fn test_fetch_remote_models_requires_key() {
        let config = ModelConfig::default();
        let err = fetch_remote_models(&config).await.unwrap_err();
        assert!(err
            .to_string()
            .contains("GROQ_API_KEY environment variable is not set."));
    }

    #[tokio::test]
    async fn test_fetch_remote_models_sorted_labels() {
        let app = Router::new().route(
            "/models",
            get(|| async {
                Json(serde_json::json!({
                    "object": "list",
                    "data": [
                        {"id": "whisper-large-v3", "owned_by": "OpenAI"},
                        {"id": "gemma2-9b-it", "owned_by": "Google"}
                    ]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = ModelConfig {
            base_url: format!("http://{}", addr),
            api_key: Some("test-key".to_string()),
            ..ModelConfig::default()
        };
        let labels = fetch_remote_models(&config).await.unwrap();

        assert_eq!(
            labels,
            vec![
                "gemma2-9b-it FROM- Google".to_string(),
                "whisper-large-v3 FROM- OpenAI".to_string()
            ]
        );
    }
}
