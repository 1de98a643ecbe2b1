//! Retrieval components for grounded answering.
//!
//! # Architecture
//!
//! - [`Chunker`]: splits extracted text into overlapping windows
//! - [`Embedder`]: converts text to vectors through a provider model
//! - [`VectorStore`]: stores chunk vectors and runs threshold top-k search,
//!   backed by [`MemoryStore`] (embedded) or [`QdrantStore`] (gRPC)
//!
//! # How It Works
//!
//! 1. **Indexing Phase**:
//!    - Documents are split into chunks (default: 1000 chars with 200 overlap)
//!    - Every chunk of a document is embedded with one batch call
//!    - Chunks with valid embeddings are inserted and committed
//!
//! 2. **Retrieval Phase**:
//!    - A question is embedded
//!    - The store returns up to `max_similar_chunks` chunks scoring at least
//!      `similarity_threshold`, ranked from 1
//!    - The chunk contents become the answerer's context passages

mod chunker;
mod embedder;
mod memory_store;
mod qdrant_store;
mod store;
mod types;

pub use chunker::{generate_chunk_id, Chunker, ChunkerError};
pub use embedder::{cosine_similarity, find_most_similar, validate_vector, Embedder, EmbedderError};
pub use memory_store::MemoryStore;
pub use qdrant_store::QdrantStore;
pub use store::{create_vector_store, VectorStore};
pub use types::{Chunk, EmbeddingVector, Metadata, VectorSearchResult};

use thiserror::Error;

/// Errors raised while assembling the retrieval components.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Invalid chunking parameters: {0}")]
    Chunker(#[from] ChunkerError),

    #[error("Embedding backend error: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("Vector store error: {0:#}")]
    Store(#[from] anyhow::Error),
}
