//! In-memory vector storage and search.
//!
//! Keeps chunks in process and scores them with a linear cosine scan. When a
//! snapshot path is configured, every write is flushed to a JSON file which
//! is loaded again on the next connect. A write becomes visible to searches
//! only once its snapshot has been written.

use super::embedder::{cosine_similarity, validate_vector};
use super::store::{check_query, top_scores, VectorStore};
use super::types::{Chunk, VectorSearchResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    dimension: usize,
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    dimension: usize,
    #[serde(default)]
    chunks: Vec<Chunk>,
}

/// An in-process vector store for chunk embeddings.
///
/// No deduplication is performed: inserting the same chunk twice stores it
/// twice.
pub struct MemoryStore {
    dimension: usize,
    path: Option<PathBuf>,
    chunks: RwLock<Vec<Chunk>>,
    loaded: OnceCell<()>,
}

impl MemoryStore {
    pub fn new(dimension: usize, path: Option<impl Into<PathBuf>>) -> Self {
        Self {
            dimension,
            path: path.map(Into::into),
            chunks: RwLock::new(Vec::new()),
            loaded: OnceCell::new(),
        }
    }

    /// A store that is never written to disk.
    pub fn ephemeral(dimension: usize) -> Self {
        Self::new(dimension, None::<PathBuf>)
    }

    async fn load_snapshot(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "No index snapshot yet");
            return Ok(());
        }

        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read index snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse index snapshot {}", path.display()))?;

        if snapshot.version != SNAPSHOT_VERSION || snapshot.dimension != self.dimension {
            warn!(
                path = %path.display(),
                version = snapshot.version,
                dimension = snapshot.dimension,
                expected_dimension = self.dimension,
                "Index snapshot is incompatible, starting with an empty index"
            );
            return Ok(());
        }

        let mut chunks = self.chunks.write().await;
        *chunks = snapshot.chunks;
        info!(path = %path.display(), count = chunks.len(), "Loaded index snapshot");
        Ok(())
    }

    /// Writes `chunks` to the snapshot file, if any.
    ///
    /// The file is replaced atomically: a failed write leaves the previous
    /// snapshot intact.
    async fn commit(&self, chunks: &[Chunk]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let data = serde_json::to_string(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension,
            chunks,
        })?;

        let staging = staging_path(path);
        tokio::fs::write(&staging, data)
            .await
            .with_context(|| format!("Failed to write index snapshot {}", staging.display()))?;
        if let Err(e) = tokio::fs::rename(&staging, path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e).with_context(|| format!("Failed to replace index snapshot {}", path.display()));
        }

        debug!(path = %path.display(), count = chunks.len(), "Index snapshot written");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn connect(&self) -> Result<()> {
        self.loaded.get_or_try_init(|| self.load_snapshot()).await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.connect().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Index health check failed: {:#}", e);
                false
            }
        }
    }

    async fn insert(&self, chunks: Vec<Chunk>) -> Result<usize> {
        self.connect().await?;

        let mut stored = self.chunks.write().await;
        let before = stored.len();

        for chunk in chunks {
            let valid = chunk
                .embedding
                .as_deref()
                .map(|embedding| validate_vector(embedding, self.dimension));

            match valid {
                Some(true) => stored.push(chunk),
                Some(false) => {
                    warn!(
                        chunk_id = %chunk.id,
                        len = chunk.embedding.as_ref().map_or(0, Vec::len),
                        expected = self.dimension,
                        "Skipping chunk with invalid embedding"
                    );
                }
                None => {
                    warn!(chunk_id = %chunk.id, source = %chunk.source_file, "Skipping chunk without embedding");
                }
            }
        }

        let inserted = stored.len() - before;
        if inserted > 0 {
            if let Err(e) = self.commit(&stored).await {
                stored.truncate(before);
                return Err(e);
            }
        }

        debug!(inserted, total = stored.len(), "Chunks inserted");
        Ok(inserted)
    }

    async fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<VectorSearchResult>> {
        self.connect().await?;

        check_query(query, self.dimension)?;

        let stored = self.chunks.read().await;
        let scored = stored
            .iter()
            .enumerate()
            .filter_map(|(i, chunk)| {
                let embedding = chunk.embedding.as_deref()?;
                Some((i, cosine_similarity(query, embedding)))
            })
            .collect();

        Ok(top_scores(scored, top_k, threshold)
            .into_iter()
            .enumerate()
            .map(|(rank, (i, similarity_score))| VectorSearchResult {
                chunk: stored[i].without_embedding(),
                similarity_score,
                rank: rank + 1,
            })
            .collect())
    }

    async fn delete_by_source(&self, source_file: &str) -> Result<()> {
        self.connect().await?;

        let mut stored = self.chunks.write().await;
        let kept: Vec<Chunk> = stored
            .iter()
            .filter(|chunk| chunk.source_file != source_file)
            .cloned()
            .collect();
        let removed = stored.len() - kept.len();

        if removed > 0 {
            self.commit(&kept).await?;
            *stored = kept;
        }

        info!(source = source_file, removed, "Deleted chunks by source");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.connect().await?;

        let mut stored = self.chunks.write().await;
        self.commit(&[]).await?;
        stored.clear();

        info!("Index cleared");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        self.connect().await?;
        Ok(self.chunks.read().await.len())
    }

    async fn indexed_sources(&self) -> Result<Vec<String>> {
        self.connect().await?;
        let stored = self.chunks.read().await;
        let sources: BTreeSet<&str> = stored.iter().map(|c| c.source_file.as_str()).collect();
        Ok(sources.into_iter().map(String::from).collect())
    }
}
