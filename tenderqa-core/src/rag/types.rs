use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form, key-ordered metadata attached to chunks and questions.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// An embedding vector produced by the embedding model.
pub type EmbeddingVector = Vec<f32>;

/// A bounded slice of source text plus its provenance.
///
/// Chunks are the unit of retrieval: each one is embedded, stored in the
/// vector index, and handed to the answering model as a context passage.
///
/// `chunk_index` is unique and increasing per `source_file`. The `id` is
/// derived from content, source and index plus a per-run random suffix, so
/// re-indexing the same corpus yields new ids.
///
/// # Example
///
/// ```no_run
/// # use tenderqa_core::rag::Chunk;
/// let chunk = Chunk::new("chunk_1", "Our ISO 27001 certificate...", "policies.txt", 0)
///     .with_metadata("chunk_type", "single");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub source_file: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingVector>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        source_file: impl Into<String>,
        chunk_index: usize,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source_file: source_file.into(),
            chunk_index,
            embedding: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: EmbeddingVector) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Copies everything but the embedding.
    pub fn without_embedding(&self) -> Self {
        Self {
            id: self.id.clone(),
            content: self.content.clone(),
            source_file: self.source_file.clone(),
            chunk_index: self.chunk_index,
            embedding: None,
            metadata: self.metadata.clone(),
        }
    }
}

/// A chunk returned by similarity search.
///
/// `similarity_score` is cosine similarity clamped into `[0, 1]`. `rank`
/// starts at 1 for the best match and is contiguous across a result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub chunk: Chunk,
    pub similarity_score: f32,
    pub rank: usize,
}
