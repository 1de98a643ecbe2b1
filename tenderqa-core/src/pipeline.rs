//! End-to-end build and query flow.
//!
//! Build phase: extract → chunk → embed → index.
//! Query phase: embed question → search → answer, one question at a time.

use crate::answer::Answerer;
use crate::config::{Config, ConfigError};
use crate::extract::{collect_files, extract_questions, ExtractError, PlainTextExtractor, TextExtractor};
use crate::provider::ProviderError;
use crate::rag::{create_vector_store, Chunk, Chunker, Embedder, RagError, VectorStore};
use crate::types::{AnswerRecord, IndexingReport, ProcessingReport, QuestionAnswer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error("Answering backend error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No questions found in {0}")]
    NoQuestions(PathBuf),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Reachability of the external services the pipeline depends on.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServiceStatus {
    pub vector_store: bool,
    pub embedding: bool,
    pub llm: bool,
}

impl ServiceStatus {
    pub fn all_ok(&self) -> bool {
        self.vector_store && self.embedding && self.llm
    }
}

/// Ties the chunker, embedder, vector store and answerer together.
///
/// Every operation runs sequentially. Per-item failures (an unreadable
/// file, a question without an embedding, a model that never produced a
/// valid answer) are logged and counted in the returned report; they never
/// abort the run.
pub struct Pipeline {
    config: Config,
    chunker: Chunker,
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    answerer: Answerer,
    extractor: Arc<dyn TextExtractor>,
}

impl Pipeline {
    /// Builds every component from configuration and connects the store.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use tenderqa_core::{Config, Pipeline};
    /// # async fn example() {
    /// let pipeline = Pipeline::new(Config::default()).await.unwrap();
    /// let report = pipeline.index_directory("./knowledge_base").await.unwrap();
    /// println!("{} chunks stored", report.vectors_stored);
    /// # }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let embedder = Embedder::from_config(&config.embedding).map_err(RagError::from)?;
        let dimension = embedder.dimension().await;
        let store = create_vector_store(&config.storage, dimension)
            .await
            .map_err(RagError::Store)?;
        let answerer = Answerer::from_config(&config.llm, config.system_prompt.clone())?;

        Self::from_parts(config, embedder, store, answerer)
    }

    /// Assembles a pipeline from already-built components.
    pub fn from_parts(
        config: Config,
        embedder: Embedder,
        store: Arc<dyn VectorStore>,
        answerer: Answerer,
    ) -> Result<Self> {
        let chunker = Chunker::from_config(&config.rag).map_err(RagError::from)?;

        Ok(Self {
            config,
            chunker,
            embedder,
            store,
            answerer,
            extractor: Arc::new(PlainTextExtractor),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn answerer(&self) -> &Answerer {
        &self.answerer
    }

    /// Recursively indexes every matching file under `dir`.
    ///
    /// Fails only if the directory cannot be walked.
    pub async fn index_directory(&self, dir: impl AsRef<Path>) -> Result<IndexingReport> {
        let dir = dir.as_ref();
        let files = collect_files(dir, &self.config.rag.indexer).await?;
        info!("Found {} files to index in {}", files.len(), dir.display());
        Ok(self.index_files(&files).await)
    }

    /// Indexes the given files one after another.
    pub async fn index_files(&self, files: &[PathBuf]) -> IndexingReport {
        let start = Instant::now();
        let mut report = IndexingReport::default();

        for (i, path) in files.iter().enumerate() {
            info!("Indexing file {}/{}: {}", i + 1, files.len(), path.display());

            let text = self.extractor.extract(path).await;
            if text.trim().is_empty() {
                warn!(path = %path.display(), "No text extracted, skipping");
                continue;
            }

            let size_mb = match tokio::fs::metadata(path).await {
                Ok(meta) => Some(round2(meta.len() as f64 / (1024.0 * 1024.0))),
                Err(_) => None,
            };

            let source = path.to_string_lossy();
            match self.index_document(&text, &source, size_mb).await {
                Ok((created, stored)) => {
                    report.files_processed += 1;
                    report.chunks_created += created;
                    report.vectors_stored += stored;
                }
                Err(e) => {
                    let message = format!("Failed to index {}: {}", path.display(), e);
                    error!("{}", message);
                    report.errors.push(message);
                }
            }
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            files = report.files_processed,
            chunks = report.chunks_created,
            vectors = report.vectors_stored,
            errors = report.errors.len(),
            "Indexing finished in {:.1}s",
            report.elapsed_secs
        );
        report
    }

    /// Indexes raw text under the given source name.
    pub async fn index_text(&self, text: &str, source: &str) -> Result<IndexingReport> {
        let start = Instant::now();
        let (chunks_created, vectors_stored) = self.index_document(text, source, None).await?;

        Ok(IndexingReport {
            files_processed: usize::from(chunks_created > 0),
            chunks_created,
            vectors_stored,
            elapsed_secs: start.elapsed().as_secs_f64(),
            errors: Vec::new(),
        })
    }

    /// Chunks, embeds and stores one document. Returns `(created, stored)`.
    async fn index_document(&self, text: &str, source: &str, size_mb: Option<f64>) -> Result<(usize, usize)> {
        let mut chunks = self.chunker.split(text, source);
        if chunks.is_empty() {
            warn!(source, "No chunks created");
            return Ok((0, 0));
        }

        if let Some(size_mb) = size_mb {
            for chunk in &mut chunks {
                chunk.metadata.insert("file_size_mb".to_string(), size_mb.into());
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await;
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        let created = chunks.len();
        let embedded = chunks.iter().filter(|c| c.embedding.is_some()).count();
        info!(source, "{} / {} chunks with valid embeddings", embedded, created);

        let stored = self.store.insert(chunks).await.map_err(RagError::Store)?;
        Ok((created, stored))
    }

    /// Answers questions in place, in order.
    ///
    /// Questions without an embedding are embedded first with one batch call.
    /// For each question: search the index, answer from the retrieved
    /// chunks, and record the result. A question that cannot be embedded,
    /// has no sufficiently similar chunks, or gets no valid answer is left
    /// unanswered.
    pub async fn answer_questions(&self, questions: &mut [QuestionAnswer]) -> ProcessingReport {
        let start = Instant::now();
        let total = questions.len();
        let mut report = ProcessingReport {
            total_questions: total,
            ..Default::default()
        };

        let pending: Vec<usize> = (0..total)
            .filter(|&i| questions[i].question_embedding.is_none())
            .collect();
        if !pending.is_empty() {
            let texts: Vec<String> = pending.iter().map(|&i| questions[i].question.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await;
            for (i, embedding) in pending.into_iter().zip(embeddings) {
                questions[i].question_embedding = embedding;
            }
        }
        info!(
            "Embeddings available for {} / {} questions",
            questions.iter().filter(|q| q.question_embedding.is_some()).count(),
            total
        );

        let rag = &self.config.rag;
        for (i, question) in questions.iter_mut().enumerate() {
            info!("Processing question {}/{}", i + 1, total);

            let Some(embedding) = question.question_embedding.as_deref() else {
                warn!("Question {} has no embedding, skipped", i + 1);
                continue;
            };

            let results = match self
                .store
                .search(embedding, rag.max_similar_chunks, rag.similarity_threshold)
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    let message = format!("Search failed for question {}: {:#}", i + 1, e);
                    error!("{}", message);
                    report.errors.push(message);
                    continue;
                }
            };

            if results.is_empty() {
                warn!("No similar chunks found for question {}", i + 1);
                continue;
            }

            let context: Vec<String> = results.iter().map(|r| r.chunk.content.clone()).collect();
            question.chunks_used = results.into_iter().map(|r| r.chunk).collect::<Vec<Chunk>>();

            match self
                .answerer
                .answer(&question.question, &context, self.config.llm.max_retries)
                .await
            {
                Some(response) => {
                    info!("Answer generated for question {} (confidence: {:.2})", i + 1, response.confidence);
                    question.apply(response);
                    report.questions_answered += 1;
                }
                None => warn!("Failed to generate an answer for question {}", i + 1),
            }
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            "Processing finished: {}/{} questions answered",
            report.questions_answered, report.total_questions
        );
        report
    }

    /// Extracts the questions of one questionnaire, answers them, and writes
    /// `<stem>_results.json` to `output_dir` (or the configured output path).
    pub async fn process_questionnaire(
        &self,
        path: impl AsRef<Path>,
        output_dir: Option<&Path>,
    ) -> Result<ProcessingReport> {
        let start = Instant::now();
        let path = path.as_ref();
        info!("Processing questionnaire {}", path.display());

        let text = self.extractor.extract(path).await;
        let mut questions = extract_questions(&text, &path.to_string_lossy());
        if questions.is_empty() {
            return Err(PipelineError::NoQuestions(path.to_path_buf()));
        }
        info!("{} questions extracted", questions.len());

        let mut report = self.answer_questions(&mut questions).await;

        let output_dir = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&self.config.storage.output_path));
        let output_file = write_results(&questions, path, &output_dir).await?;

        report.input_file = path.to_string_lossy().into_owned();
        report.output_file = output_file.to_string_lossy().into_owned();
        report.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    /// Removes every chunk indexed from `source`.
    pub async fn remove_source(&self, source: &str) -> Result<()> {
        self.store.delete_by_source(source).await.map_err(RagError::Store)?;
        Ok(())
    }

    /// Removes every chunk from the index.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await.map_err(RagError::Store)?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.count().await.map_err(RagError::Store)?)
    }

    pub async fn indexed_sources(&self) -> Result<Vec<String>> {
        Ok(self.store.indexed_sources().await.map_err(RagError::Store)?)
    }

    /// Probes the vector store, the embedding model and the answering model.
    pub async fn health_check(&self) -> ServiceStatus {
        let vector_store = self.store.health_check().await;
        let embedding = match self.embedder.validate().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Embedding model check failed: {}", e);
                false
            }
        };
        let llm = self.answerer.test_connection().await;

        let status = ServiceStatus {
            vector_store,
            embedding,
            llm,
        };
        debug!(?status, "Health check complete");
        status
    }
}

/// Writes the answer records for `questions` as a pretty JSON array.
///
/// The file is named after the input's stem: `tender.txt` becomes
/// `<output_dir>/tender_results.json`.
pub async fn write_results(questions: &[QuestionAnswer], input: &Path, output_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "questionnaire".to_string());
    let output = output_dir.join(format!("{}_results.json", stem));

    let records: Vec<AnswerRecord> = questions.iter().map(QuestionAnswer::to_record).collect();
    tokio::fs::write(&output, serde_json::to_string_pretty(&records)?).await?;

    info!("Results written to {}", output.display());
    Ok(output)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::LlmResponse;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_results_naming_and_shape() {
        let dir = TempDir::new().unwrap();
        let mut answered = QuestionAnswer::new("Do you hold ISO 27001?");
        answered.apply(LlmResponse {
            answer: "Yes".into(),
            confidence: 0.9,
            sources: vec!["certs.txt".into()],
        });
        let unanswered = QuestionAnswer::new("What is your favourite colour?");

        let output = write_results(&[answered, unanswered], Path::new("/in/tender_2024.txt"), dir.path())
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("tender_2024_results.json"));

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let records = written.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["answer"], "Yes");
        assert_eq!(records[0]["sources"][0], "certs.txt");
        assert!(records[1]["answer"].is_null());
        assert!(records[1].get("metadata").is_some());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.123456), 0.12);
        assert_eq!(round2(2.499), 2.5);
    }
}
