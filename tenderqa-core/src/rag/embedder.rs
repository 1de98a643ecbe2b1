//! Embedding generation using LLM providers.
//!
//! This module converts text into vector embeddings with a provider's
//! embedding model, and holds the vector helpers (cosine similarity and
//! validation) shared by the stores.

use super::types::EmbeddingVector;
use crate::config::EmbeddingConfig;
use crate::provider::{create_provider, Provider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Text sent to the model to discover its output dimension.
const DIMENSION_PROBE: &str = "test";

/// Errors that can occur while validating the embedding backend.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The provider API returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The API response contained no embeddings.
    #[error("No embeddings returned")]
    NoEmbeddings,

    /// The model returned a vector that failed validation.
    #[error("Invalid embedding of length {actual} (expected {expected})")]
    InvalidVector { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Generates vector embeddings for text using a provider embedding model.
///
/// Per-item failures never fail a call: blank input, provider errors and
/// invalid vectors all map to `None` for the affected slot.
///
/// The effective dimension is discovered by embedding a fixed probe once
/// and cached for the embedder's lifetime. If the probe fails, the
/// configured dimension is used instead.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
    configured_dimension: usize,
    dimension: Arc<OnceCell<usize>>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, configured_dimension: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            configured_dimension,
            dimension: Arc::new(OnceCell::new()),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let provider = create_provider(config.provider, &config.base_url, config.timeout())?;
        Ok(Self::new(provider, config.model.clone(), config.dimension))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the model's output dimension, probing the model on first use.
    pub async fn dimension(&self) -> usize {
        *self
            .dimension
            .get_or_init(|| async {
                match self.probe_dimension().await {
                    Ok(dim) => {
                        if dim != self.configured_dimension {
                            warn!(
                                model = %self.model,
                                reported = dim,
                                configured = self.configured_dimension,
                                "Embedding dimension differs from configuration, using reported value"
                            );
                        }
                        dim
                    }
                    Err(e) => {
                        warn!(
                            model = %self.model,
                            "Dimension probe failed ({}), using configured dimension {}",
                            e,
                            self.configured_dimension
                        );
                        self.configured_dimension
                    }
                }
            })
            .await
    }

    async fn probe_dimension(&self) -> Result<usize> {
        let vectors = self
            .provider
            .embed(&[DIMENSION_PROBE.to_string()], &self.model)
            .await?;
        match vectors.into_iter().next() {
            Some(v) if !v.is_empty() => Ok(v.len()),
            _ => Err(EmbedderError::NoEmbeddings),
        }
    }

    /// Generates an embedding for one text.
    ///
    /// Returns `None` for blank text, provider failures, and vectors that do
    /// not validate against the model dimension.
    pub async fn embed(&self, text: &str) -> Option<EmbeddingVector> {
        if text.trim().is_empty() {
            debug!("Skipping embedding of blank text");
            return None;
        }

        let dim = self.dimension().await;
        match self.provider.embed(&[text.to_string()], &self.model).await {
            Ok(vectors) => vectors.into_iter().next().filter(|v| {
                let valid = validate_vector(v, dim);
                if !valid {
                    warn!(len = v.len(), expected = dim, "Discarding invalid embedding");
                }
                valid
            }),
            Err(e) => {
                warn!("Embedding failed: {}", e);
                None
            }
        }
    }

    /// Generates embeddings for many texts with a single model call.
    ///
    /// The result has one slot per input, in input order. Blank inputs are
    /// filtered out before the call and their slots stay `None`. If the call
    /// fails or returns the wrong number of vectors, every slot is `None`.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Option<EmbeddingVector>> {
        let mut results: Vec<Option<EmbeddingVector>> = vec![None; texts.len()];

        let (positions, inputs): (Vec<usize>, Vec<String>) = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.clone()))
            .unzip();

        if inputs.is_empty() {
            debug!(count = texts.len(), "No non-blank texts to embed");
            return results;
        }

        let dim = self.dimension().await;
        let vectors = match self.provider.embed(&inputs, &self.model).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(count = inputs.len(), "Batch embedding failed: {}", e);
                return results;
            }
        };

        if vectors.len() != inputs.len() {
            warn!(
                expected = inputs.len(),
                actual = vectors.len(),
                "Batch embedding returned the wrong number of vectors"
            );
            return results;
        }

        let mut invalid = 0;
        for (position, vector) in positions.into_iter().zip(vectors) {
            if validate_vector(&vector, dim) {
                results[position] = Some(vector);
            } else {
                invalid += 1;
            }
        }

        if invalid > 0 {
            warn!(invalid, expected_dim = dim, "Discarded invalid embeddings from batch");
        }
        debug!(
            requested = texts.len(),
            embedded = results.iter().filter(|r| r.is_some()).count(),
            "Batch embedding complete"
        );

        results
    }

    /// Checks that the backend answers with a vector of the expected shape.
    pub async fn validate(&self) -> Result<usize> {
        let vectors = self
            .provider
            .embed(&[DIMENSION_PROBE.to_string()], &self.model)
            .await?;
        let vector = vectors.into_iter().next().ok_or(EmbedderError::NoEmbeddings)?;

        let dim = self.dimension().await;
        if !validate_vector(&vector, dim) {
            return Err(EmbedderError::InvalidVector {
                expected: dim,
                actual: vector.len(),
            });
        }

        info!(model = %self.model, dimension = dim, "Embedding model validated");
        Ok(dim)
    }
}

/// Cosine similarity clamped into `[0, 1]`.
///
/// Returns `0.0` when either vector is empty, the lengths differ, or a norm
/// is zero. Accumulates in `f64` so `cosine_similarity(v, v)` is exactly 1.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b).sqrt();
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(0.0, 1.0) as f32
}

/// Whether `vector` is storable: non-empty, finite, and exactly `dimension` long.
pub fn validate_vector(vector: &[f32], dimension: usize) -> bool {
    !vector.is_empty() && vector.len() == dimension && vector.iter().all(|x| x.is_finite())
}

/// Ranks `candidates` against `query`, returning up to `top_k` `(index, score)`
/// pairs in descending score order. Ties keep candidate order.
pub fn find_most_similar(query: &[f32], candidates: &[EmbeddingVector], top_k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine_similarity(query, c)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatRequest, ChatResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as `[len, vowels, 1, 0]`; texts containing "FAIL" fail the call.
    struct FakeProvider {
        calls: AtomicUsize,
        dim: usize,
    }

    impl FakeProvider {
        fn new(dim: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                dim,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn chat(&self, _request: ChatRequest) -> crate::provider::Result<ChatResponse> {
            Err(ProviderError::Other("chat not supported".into()))
        }

        async fn embed(&self, inputs: &[String], _model: &str) -> crate::provider::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if inputs.iter().any(|t| t.contains("FAIL")) {
                return Err(ProviderError::Api("model unavailable".into()));
            }
            Ok(inputs
                .iter()
                .map(|t| {
                    if t.contains("BAD") {
                        return vec![f32::NAN; self.dim];
                    }
                    let vowels = t.chars().filter(|c| "aeiou".contains(*c)).count();
                    let mut v = vec![t.len() as f32, vowels as f32, 1.0];
                    v.resize(self.dim, 0.0);
                    v
                })
                .collect())
        }

        async fn list_models(&self) -> crate::provider::Result<Vec<String>> {
            Ok(vec!["fake".into()])
        }
    }

    #[tokio::test]
    async fn test_dimension_is_probed_once() {
        let provider = FakeProvider::new(4);
        let embedder = Embedder::new(provider.clone(), "fake", 384);

        assert_eq!(embedder.dimension().await, 4);
        assert_eq!(embedder.dimension().await, 4);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_blank_text_yields_none() {
        let provider = FakeProvider::new(4);
        let embedder = Embedder::new(provider.clone(), "fake", 4);

        assert!(embedder.embed("   ").await.is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_embed_single() {
        let embedder = Embedder::new(FakeProvider::new(4), "fake", 4);
        let v = embedder.embed("hello").await.unwrap();
        assert_eq!(v, vec![5.0, 2.0, 1.0, 0.0]);
        assert!(embedder.embed("FAIL here").await.is_none());
        assert!(embedder.embed("BAD vector").await.is_none());
    }

    #[tokio::test]
    async fn test_batch_uses_one_call_and_scatters() {
        let provider = FakeProvider::new(4);
        let embedder = Embedder::new(provider.clone(), "fake", 4);
        embedder.dimension().await;
        let before = provider.calls();

        let texts = vec![
            "alpha".to_string(),
            "".to_string(),
            "beta".to_string(),
            "  ".to_string(),
            "BAD".to_string(),
        ];
        let results = embedder.embed_batch(&texts).await;

        assert_eq!(provider.calls() - before, 1);
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].as_deref(), Some(&[5.0, 2.0, 1.0, 0.0][..]));
        assert!(results[1].is_none());
        assert_eq!(results[2].as_deref(), Some(&[4.0, 2.0, 1.0, 0.0][..]));
        assert!(results[3].is_none());
        assert!(results[4].is_none());
    }

    #[tokio::test]
    async fn test_batch_failure_maps_all_to_none() {
        let embedder = Embedder::new(FakeProvider::new(4), "fake", 4);
        let texts = vec!["one".to_string(), "FAIL".to_string()];
        let results = embedder.embed_batch(&texts).await;
        assert_eq!(results, vec![None, None]);
    }

    #[tokio::test]
    async fn test_validate_reports_dimension() {
        let embedder = Embedder::new(FakeProvider::new(8), "fake", 384);
        assert_eq!(embedder.validate().await.unwrap(), 8);
    }

    #[test]
    fn test_similarity_properties() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        let w = vec![1.0, 0.5, 2.0, -0.3];

        assert_eq!(cosine_similarity(&v, &v), 1.0);
        assert_eq!(cosine_similarity(&v, &w), cosine_similarity(&w, &v));

        let s = cosine_similarity(&v, &w);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn test_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_validate_vector() {
        assert!(validate_vector(&[0.1, 0.2], 2));
        assert!(!validate_vector(&[], 0));
        assert!(!validate_vector(&[0.1], 2));
        assert!(!validate_vector(&[0.1, f32::NAN], 2));
        assert!(!validate_vector(&[0.1, f32::INFINITY], 2));
    }

    #[test]
    fn test_find_most_similar() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.1], vec![1.0, 0.0], vec![1.0, 0.0]];
        let ranked = find_most_similar(&query, &candidates, 3);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked[1].0, 3);
        assert_eq!(ranked[2].0, 1);
    }

    #[tokio::test]
    async fn test_unresponsive_backend_yields_no_embeddings() {
        let config = EmbeddingConfig {
            base_url: crate::provider::silent_server().await,
            dimension: 4,
            timeout_secs: 1,
            ..EmbeddingConfig::default()
        };
        let embedder = Embedder::from_config(&config).unwrap();

        let bounded = std::time::Duration::from_secs(10);
        let dimension = tokio::time::timeout(bounded, embedder.dimension()).await.unwrap();
        assert_eq!(dimension, 4);

        let batch = tokio::time::timeout(bounded, embedder.embed_batch(&["hello".to_string()]))
            .await
            .unwrap();
        assert_eq!(batch, vec![None]);
    }
}
