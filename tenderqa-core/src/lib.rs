//! tenderqa-core - Retrieval-augmented answering for tender questionnaires
//!
//! Provides the components for answering questionnaires from a private
//! knowledge base:
//! - LLM provider abstraction (OpenAI-compatible servers, Ollama)
//! - RAG components (chunking, embeddings, vector stores)
//! - Answering with retry and JSON contract enforcement
//! - The end-to-end indexing and questionnaire pipeline
//!
//! ## Primary API
//!
//! Most users should drive everything through [`Pipeline`].

// Public modules
pub mod answer;
pub mod config;
pub mod extract;
pub mod patterns;
pub mod pipeline;
pub mod provider;
pub mod rag;
pub mod types;

// Public exports
pub use answer::{Answerer, BackoffPolicy, LlmResponse};
pub use config::{Config, ConfigError, IndexerConfig};
pub use pipeline::{Pipeline, PipelineError, ServiceStatus};
pub use types::{AnswerRecord, IndexingReport, ProcessingReport, QuestionAnswer};

// Provider exports
pub use provider::{ChatRequest, ChatResponse, Message, Provider, ProviderError};
