//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements the Provider trait.

use super::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a new Ollama provider for the server at `base_url`.
    ///
    /// Every request is bounded by `timeout` unless the request sets its own.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::Request)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

async fn checked_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);

        let mut options = HashMap::new();
        options.insert("temperature".to_string(), serde_json::json!(request.temperature));
        options.insert("num_predict".to_string(), serde_json::json!(request.max_tokens));

        let ollama_request = OllamaChatRequest {
            model: request.model.clone(),
            messages: request.messages.clone(),
            options,
            stream: false,
        };

        let mut builder = self.http_client.post(&url).json(&ollama_request);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let body = checked_body(builder.send().await?).await?;
        let ollama_response: OllamaChatResponse = serde_json::from_str(&body)?;

        Ok(ChatResponse {
            model: ollama_response.model,
            content: ollama_response.message.content,
        })
    }

    async fn embed(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let embed_request = OllamaEmbedRequest {
            model: model.to_string(),
            input: inputs.to_vec(),
        };

        let response = self.http_client.post(&url).json(&embed_request).send().await?;
        let body = checked_body(response).await?;
        let embed_response: OllamaEmbedResponse = serde_json::from_str(&body)?;

        if embed_response.embeddings.len() != inputs.len() {
            return Err(ProviderError::Other(format!(
                "Ollama returned {} embeddings for {} inputs",
                embed_response.embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embed_response.embeddings)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let body = checked_body(self.http_client.get(&url).send().await?).await?;
        let tags: OllamaTags = serde_json::from_str(&body)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    options: HashMap<String, serde_json::Value>,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaChatResponse {
    model: String,
    message: Message,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_is_not_streamed() {
        let request = OllamaChatRequest {
            model: "mistral".into(),
            messages: vec![Message::user("q")],
            options: HashMap::new(),
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"model":"mistral","created_at":"2024-01-01T00:00:00Z","message":{"role":"assistant","content":"{}"},"done":true}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.message.content, "{}");
    }

    #[test]
    fn test_embed_response_defaults_to_empty() {
        let parsed: OllamaEmbedResponse = serde_json::from_str(r#"{"model":"all-minilm"}"#).unwrap();
        assert!(parsed.embeddings.is_empty());
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let url = crate::provider::silent_server().await;
        let provider = OllamaProvider::new(url, Duration::from_millis(200)).unwrap();

        let embed = tokio::time::timeout(
            Duration::from_secs(5),
            provider.embed(&["hello".to_string()], "all-minilm"),
        )
        .await
        .expect("embed request was not bounded");
        assert!(embed.is_err());
    }
}
