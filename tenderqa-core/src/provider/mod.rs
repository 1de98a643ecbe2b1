//! LLM provider abstraction layer.
//!
//! This module defines a common interface for the HTTP backends that serve
//! chat completions and embeddings.

mod types;
pub mod ollama;
pub mod openai;

use crate::config::ProviderKind;
use std::sync::Arc;
use std::time::Duration;

// Re-export common types
pub use types::{
    ChatRequest,
    ChatResponse,
    Message,
    Provider,
    ProviderError,
    Result,
};

// Re-export provider implementations
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Creates the provider speaking `kind`'s dialect at `base_url`.
///
/// `timeout` bounds every request the provider sends.
pub fn create_provider(kind: ProviderKind, base_url: &str, timeout: Duration) -> Result<Arc<dyn Provider>> {
    Ok(match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(base_url, timeout)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(base_url, timeout)?),
    })
}

/// Starts a server that accepts connections and never answers.
#[cfg(test)]
pub(crate) async fn silent_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}
