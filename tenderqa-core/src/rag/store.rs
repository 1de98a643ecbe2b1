//! Vector store abstraction and factory.
//!
//! This module provides a unified interface over the in-process index and
//! the Qdrant backend.

use super::embedder::validate_vector;
use super::memory_store::MemoryStore;
use super::qdrant_store::QdrantStore;
use super::types::{Chunk, VectorSearchResult};
use crate::config::{StorageConfig, StorageMode};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Unified interface for vector index operations.
///
/// Writes are committed before the call returns: a successful `insert`,
/// `delete_by_source` or `clear` is visible to the next `search` in the
/// same process.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Opens the backend and defines the collection if it does not exist.
    ///
    /// Safe to call repeatedly; later calls are no-ops.
    async fn connect(&self) -> Result<()>;

    /// Reports whether the backend is reachable, reconnecting if needed.
    async fn health_check(&self) -> bool;

    /// Stores chunks and their embeddings, returning how many were inserted.
    ///
    /// Chunks without an embedding, or with one of the wrong dimension, are
    /// skipped with a warning and do not fail the batch.
    async fn insert(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Returns up to `top_k` chunks scoring at least `threshold`, best first.
    ///
    /// An empty result is not an error.
    async fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<VectorSearchResult>>;

    /// Removes every chunk whose `source_file` equals `source_file` exactly.
    async fn delete_by_source(&self, source_file: &str) -> Result<()>;

    /// Removes all chunks.
    async fn clear(&self) -> Result<()>;

    /// Returns the number of stored chunks.
    async fn count(&self) -> Result<usize>;

    /// Returns the distinct source files present in the index.
    async fn indexed_sources(&self) -> Result<Vec<String>>;
}

/// Rejects query vectors that are empty, non-finite or of the wrong dimension.
pub(crate) fn check_query(query: &[f32], dimension: usize) -> Result<()> {
    if !validate_vector(query, dimension) {
        bail!(
            "Invalid query vector of length {} (expected {})",
            query.len(),
            dimension
        );
    }
    Ok(())
}

/// Filters and orders scored entries.
///
/// Scores are clamped into `[0, 1]`, entries below `threshold` are dropped,
/// the rest are sorted by descending score (stable, so ties keep input order)
/// and cut to `top_k`.
pub(crate) fn top_scores<T>(hits: Vec<(T, f32)>, top_k: usize, threshold: f32) -> Vec<(T, f32)> {
    let mut hits: Vec<(T, f32)> = hits
        .into_iter()
        .map(|(item, score)| (item, if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }))
        .filter(|(_, score)| *score >= threshold)
        .collect();

    hits.sort_by(|a, b| b.1.total_cmp(&a.1));
    hits.truncate(top_k);
    hits
}

/// Orders scored chunks into a search result set ranked from 1.
pub(crate) fn rank_hits(hits: Vec<(Chunk, f32)>, top_k: usize, threshold: f32) -> Vec<VectorSearchResult> {
    top_scores(hits, top_k, threshold)
        .into_iter()
        .enumerate()
        .map(|(i, (chunk, similarity_score))| VectorSearchResult {
            chunk,
            similarity_score,
            rank: i + 1,
        })
        .collect()
}

/// Creates and connects the vector store selected by the storage mode.
///
/// - `Embedded` mode keeps the index in process, snapshotted to a JSON file
/// - `Grpc` mode uses a Qdrant server
pub async fn create_vector_store(storage_config: &StorageConfig, dimension: usize) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match &storage_config.storage_mode {
        StorageMode::Embedded { path } => Arc::new(MemoryStore::new(dimension, path.clone())),
        StorageMode::Grpc { url } => Arc::new(QdrantStore::new(
            url.clone(),
            storage_config.vector_db.collection_name.clone(),
            dimension,
        )),
    };

    store.connect().await?;
    Ok(store)
}
