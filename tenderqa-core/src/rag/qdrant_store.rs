//! Qdrant vector database storage implementation.
//!
//! This module provides integration with a Qdrant server over gRPC. The
//! connection is opened lazily on first use and the collection is created
//! once, guarded by an existence check.

use super::embedder::validate_vector;
use super::store::{check_query, rank_hits, VectorStore};
use super::types::{Chunk, Metadata, VectorSearchResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        vectors_config::Config, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
        PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
        VectorParamsBuilder, VectorsConfig,
    },
    Payload, Qdrant,
};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Qdrant-based vector store for chunk embeddings.
///
/// Upserts wait for the server to apply the write before returning, which
/// is the commit point for search visibility. Point ids are derived from
/// chunk ids, so re-inserting a chunk with the same id replaces it.
pub struct QdrantStore {
    url: String,
    collection_name: String,
    dimension: usize,
    client: OnceCell<Qdrant>,
}

impl QdrantStore {
    pub fn new(url: impl Into<String>, collection_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            url: url.into(),
            collection_name: collection_name.into(),
            dimension,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Qdrant> {
        self.client
            .get_or_try_init(|| async {
                let client = Qdrant::from_url(&self.url)
                    .build()
                    .context("Failed to connect to Qdrant server")?;
                ensure_collection(&client, &self.collection_name, self.dimension).await?;
                info!(url = %self.url, collection = %self.collection_name, "Connected to Qdrant");
                Ok::<_, anyhow::Error>(client)
            })
            .await
    }
}

async fn ensure_collection(client: &Qdrant, collection_name: &str, dimension: usize) -> Result<()> {
    let exists = client
        .collection_exists(collection_name)
        .await
        .context("Failed to check collection")?;

    if !exists {
        client
            .create_collection(CreateCollectionBuilder::new(collection_name).vectors_config(VectorsConfig {
                config: Some(Config::Params(
                    VectorParamsBuilder::new(dimension as u64, Distance::Cosine).build(),
                )),
            }))
            .await
            .context("Failed to create collection")?;
        info!(collection = collection_name, dimension, "Created collection");
    }

    Ok(())
}

/// Maps a chunk id onto the UUID point id space Qdrant accepts.
fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

fn to_payload(chunk: &Chunk) -> Result<Payload> {
    let metadata = serde_json::to_string(&chunk.metadata)?;
    Payload::try_from(json!({
        "chunk_id": chunk.id,
        "content": chunk.content,
        "source_file": chunk.source_file,
        "chunk_index": chunk.chunk_index,
        "metadata": metadata,
    }))
    .context("Failed to build point payload")
}

fn from_payload(payload: &HashMap<String, Value>) -> Chunk {
    let text = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_default()
    };

    let chunk_index = payload
        .get("chunk_index")
        .and_then(|v| v.as_integer())
        .and_then(|i| usize::try_from(i).ok())
        .unwrap_or_default();

    let mut chunk = Chunk::new(text("chunk_id"), text("content"), text("source_file"), chunk_index);
    chunk.metadata = parse_metadata(&chunk.id, &text("metadata"));
    chunk
}

/// Parses stored metadata, falling back to an empty map.
fn parse_metadata(chunk_id: &str, raw: &str) -> Metadata {
    if raw.is_empty() {
        return Metadata::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(chunk_id, "Discarding unparsable chunk metadata: {}", e);
        Metadata::new()
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn connect(&self) -> Result<()> {
        self.client().await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => {
                warn!("Qdrant connection failed: {:#}", e);
                return false;
            }
        };

        match client.health_check().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                false
            }
        }
    }

    async fn insert(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let client = self.client().await?;

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let Some(embedding) = chunk.embedding.as_ref() else {
                warn!(chunk_id = %chunk.id, source = %chunk.source_file, "Skipping chunk without embedding");
                continue;
            };
            if !validate_vector(embedding, self.dimension) {
                warn!(chunk_id = %chunk.id, len = embedding.len(), "Skipping chunk with invalid embedding");
                continue;
            }
            points.push(PointStruct::new(point_id(&chunk.id), embedding.clone(), to_payload(&chunk)?));
        }

        if points.is_empty() {
            return Ok(0);
        }

        let inserted = points.len();
        client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await
            .context("Failed to upsert points")?;

        debug!(inserted, collection = %self.collection_name, "Points upserted");
        Ok(inserted)
    }

    async fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<VectorSearchResult>> {
        check_query(query, self.dimension)?;
        let client = self.client().await?;

        let response = client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, query.to_vec(), top_k as u64)
                    .with_payload(true)
                    .score_threshold(threshold),
            )
            .await
            .context("Failed to search points")?;

        let hits = response
            .result
            .into_iter()
            .map(|point| (from_payload(&point.payload), point.score))
            .collect();

        Ok(rank_hits(hits, top_k, threshold))
    }

    async fn delete_by_source(&self, source_file: &str) -> Result<()> {
        let client = self.client().await?;

        client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(Filter::must([Condition::matches("source_file", source_file.to_string())]))
                    .wait(true),
            )
            .await
            .context("Failed to delete points")?;

        info!(source = source_file, "Deleted chunks by source");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let client = self.client().await?;

        client
            .delete_collection(&self.collection_name)
            .await
            .context("Failed to delete collection")?;

        ensure_collection(client, &self.collection_name, self.dimension).await?;
        info!(collection = %self.collection_name, "Collection cleared");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let client = self.client().await?;

        let info = client
            .collection_info(&self.collection_name)
            .await
            .context("Failed to get collection info")?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0) as usize)
    }

    async fn indexed_sources(&self) -> Result<Vec<String>> {
        let client = self.client().await?;

        let mut sources = BTreeSet::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection_name)
                .limit(100)
                .with_payload(true);

            if let Some(off) = offset {
                builder = builder.offset(off);
            }

            let page = client.scroll(builder).await.context("Failed to scroll points")?;

            for point in &page.result {
                if let Some(source) = point.payload.get("source_file").and_then(|v| v.as_str()) {
                    sources.insert(source.to_string());
                }
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(sources.into_iter().collect())
    }
}
