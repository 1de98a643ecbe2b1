//! Grounded answering against an unreliable chat model.
//!
//! The [`Answerer`] sends one question plus its retrieved context passages to
//! the model, recovers a JSON object from whatever text comes back, and
//! retries on timeouts, transport errors and contract violations until an
//! attempt succeeds or the retry budget is spent.

mod json;
mod retry;

pub use json::{extract_json_object, parse_llm_response, response_from_text, ContractError};
pub use retry::{BackoffPolicy, FailureKind};

use crate::config::LlmConfig;
use crate::provider::{create_provider, ChatRequest, Message, Provider, ProviderError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const RESPONSE_FORMAT: &str = "Respond ONLY with a JSON object in the following format:\n\
{\n    \"answer\": \"Content of the answer\",\n    \"confidence\": 0.85,\n    \"sources\": [\"source1\", \"source2\"]\n}";

/// The structured answer recovered from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub answer: String,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Calls the chat model and enforces the answer contract.
pub struct Answerer {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
    system_prompt: String,
    backoff: BackoffPolicy,
    batch_pause: Duration,
}

impl Answerer {
    pub fn new(provider: Arc<dyn Provider>, config: &LlmConfig, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout(),
            system_prompt: system_prompt.into(),
            backoff: BackoffPolicy::from(&config.retry),
            batch_pause: config.batch_pause(),
        }
    }

    pub fn from_config(config: &LlmConfig, system_prompt: impl Into<String>) -> Result<Self, ProviderError> {
        let provider = create_provider(config.provider, &config.base_url, config.timeout())?;
        Ok(Self::new(provider, config, system_prompt))
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Builds the system and user messages for one question.
    ///
    /// Context passages are labelled `Context 1:`, `Context 2:`, ... in the
    /// order given.
    pub fn build_messages(&self, question: &str, context: &[String]) -> Vec<Message> {
        let context_text = context
            .iter()
            .enumerate()
            .map(|(i, passage)| format!("Context {}: {}", i + 1, passage))
            .collect::<Vec<_>>()
            .join("\n\n");

        let user_prompt = format!(
            "Question: {}\n\nAvailable context:\n{}\n\n{}",
            question, context_text, RESPONSE_FORMAT
        );

        vec![Message::system(&self.system_prompt), Message::user(user_prompt)]
    }

    /// Answers `question` from `context`, making at most `max_retries` attempts.
    ///
    /// Returns `None` when every attempt failed. A `max_retries` of 0 is
    /// treated as 1.
    pub async fn answer(&self, question: &str, context: &[String], max_retries: u32) -> Option<LlmResponse> {
        let max_retries = max_retries.max(1);
        let messages = self.build_messages(question, context);
        let preview: String = question.chars().take(50).collect();

        for attempt in 0..max_retries {
            debug!(attempt = attempt + 1, max_retries, question = %preview, "Requesting answer");

            let request = ChatRequest::new(&self.model, messages.clone())
                .with_temperature(self.temperature)
                .with_max_tokens(self.max_tokens)
                .with_timeout(self.timeout);

            let failure = match self.provider.chat(request).await {
                Ok(response) => match response_from_text(&response.content) {
                    Ok(parsed) => {
                        info!(confidence = parsed.confidence, attempt = attempt + 1, "Answer generated");
                        return Some(parsed);
                    }
                    Err(e) => {
                        warn!(attempt = attempt + 1, "Unusable model response: {}", e);
                        FailureKind::Soft
                    }
                },
                Err(e) => {
                    let kind = FailureKind::classify(&e);
                    warn!(attempt = attempt + 1, kind = ?kind, "Chat request failed: {}", e);
                    kind
                }
            };

            if attempt + 1 < max_retries {
                let delay = self.backoff.delay(attempt, failure);
                if !delay.is_zero() {
                    debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        error!(max_retries, question = %preview, "No usable answer after all attempts");
        None
    }

    /// Answers each `(question, context)` pair in order.
    ///
    /// Waits the configured pause between items. A failed item yields `None`
    /// in its slot and does not stop the batch.
    pub async fn answer_batch(&self, items: &[(String, Vec<String>)], max_retries: u32) -> Vec<Option<LlmResponse>> {
        let mut results = Vec::with_capacity(items.len());

        for (i, (question, context)) in items.iter().enumerate() {
            info!("Answering question {}/{}", i + 1, items.len());
            results.push(self.answer(question, context, max_retries).await);

            if i + 1 < items.len() && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        results
    }

    /// Sends one probe question and reports whether a valid answer came back.
    pub async fn test_connection(&self) -> bool {
        let context = vec!["This is a connectivity test for the answering service.".to_string()];
        match self.answer("Connectivity test", &context, 1).await {
            Some(response) if !response.answer.is_empty() => {
                info!(model = %self.model, "Answering model reachable");
                true
            }
            _ => {
                warn!(model = %self.model, "Answering model test failed");
                false
            }
        }
    }
}
