//! OpenAI-compatible provider implementation.
//!
//! Talks to any server exposing `/v1/chat/completions` and `/v1/embeddings`
//! (LM Studio, vLLM, llama.cpp server, Ollama's compatibility layer).

use super::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible HTTP provider.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    base_url: String,
    http_client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a provider for the server at `base_url` (e.g. "http://localhost:1234").
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

    async fn read_body(response: reqwest::Response) -> Result<String> {
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
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let payload = OpenAiChatRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let mut builder = self.http_client.post(&url).json(&payload);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let body = Self::read_body(builder.send().await?).await?;
        debug!(target: "tenderqa_core::provider", bytes = body.len(), "Chat completion received");

        let parsed: OpenAiChatResponse = serde_json::from_str(&body)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(ChatResponse {
            model: parsed.model.unwrap_or(request.model),
            content,
        })
    }

    async fn embed(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&OpenAiEmbedRequest { model, input: inputs })
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        let mut parsed: OpenAiEmbedResponse = serde_json::from_str(&body)?;

        if parsed.data.len() != inputs.len() {
            return Err(ProviderError::Api(format!(
                "Expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/models", self.base_url);
        let body = Self::read_body(self.http_client.get(&url).send().await?).await?;
        let parsed: OpenAiModelList = serde_json::from_str(&body)?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }
}

// OpenAI-specific request/response types (internal)

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_wire_format() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let payload = OpenAiChatRequest {
            model: "mistral",
            messages: &messages,
            max_tokens: 128,
            temperature: 0.5,
            stream: false,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["model"], "mistral");
        assert_eq!(value["stream"], false);
        assert_eq!(value["max_tokens"], 128);
        assert_eq!(value["messages"][1]["role"], "user");
    }

    #[test]
    fn test_chat_response_without_choices() {
        let parsed: OpenAiChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }

    #[test]
    fn test_embed_response_parsing() {
        let body = r#"{"data": [{"index": 1, "embedding": [0.0, 1.0]}, {"index": 0, "embedding": [1.0, 0.0]}]}"#;
        let mut parsed: OpenAiEmbedResponse = serde_json::from_str(body).unwrap();
        parsed.data.sort_by_key(|item| item.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = OpenAiProvider::new("http://localhost:1234/", Duration::from_secs(5)).unwrap();
        assert_eq!(provider.base_url, "http://localhost:1234");
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let url = crate::provider::silent_server().await;
        let provider = OpenAiProvider::new(url, Duration::from_millis(200)).unwrap();

        let embed = tokio::time::timeout(
            Duration::from_secs(5),
            provider.embed(&["hello".to_string()], "nomic-embed-text"),
        )
        .await
        .expect("embed request was not bounded");
        assert!(embed.is_err());

        let models = tokio::time::timeout(Duration::from_secs(5), provider.list_models())
            .await
            .expect("model list request was not bounded");
        assert!(models.is_err());
    }
}
