//! Build-then-query flow over an in-process index with scripted models.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tenderqa_core::answer::BackoffPolicy;
use tenderqa_core::provider::{ChatRequest, ChatResponse, Provider, ProviderError, Result};
use tenderqa_core::rag::{Embedder, MemoryStore, VectorStore};
use tenderqa_core::{Answerer, Config, Pipeline, QuestionAnswer};

const TOPICS: [&str; 3] = ["iso", "staff", "insurance"];

/// Embeds text as keyword counts over `TOPICS`, plus a catch-all axis.
/// Answers with the first context passage it was given.
struct KeywordModel {
    chat_calls: AtomicUsize,
    fail_chat: bool,
}

impl KeywordModel {
    fn new(fail_chat: bool) -> Arc<Self> {
        Arc::new(Self {
            chat_calls: AtomicUsize::new(0),
            fail_chat,
        })
    }

    fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
        let mut v: Vec<f32> = TOPICS
            .iter()
            .map(|topic| words.iter().filter(|w| *w == topic).count() as f32)
            .collect();
        let other = if v.iter().all(|x| *x == 0.0) { 1.0 } else { 0.0 };
        v.push(other);
        v
    }
}

#[async_trait]
impl Provider for KeywordModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_chat {
            return Err(ProviderError::Status {
                status: 503,
                body: "overloaded".into(),
            });
        }

        let user = &request.messages[1].content;
        let passage = user
            .lines()
            .find_map(|line| line.strip_prefix("Context 1: "))
            .unwrap_or("")
            .to_string();
        let body = serde_json::json!({
            "answer": passage,
            "confidence": 0.8,
            "sources": ["knowledge base"],
        });

        Ok(ChatResponse {
            model: request.model,
            content: format!("Here is my answer:\n{}", body),
        })
    }

    async fn embed(&self, inputs: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|t| Self::vector(t)).collect())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["keyword".into()])
    }
}

fn pipeline(model: Arc<KeywordModel>, store: Arc<dyn VectorStore>, dir: &TempDir) -> Pipeline {
    let mut config = Config::default();
    config.rag.chunk_size = 200;
    config.rag.chunk_overlap = 20;
    config.rag.similarity_threshold = 0.8;
    config.llm.max_retries = 2;
    config.storage.output_path = dir.path().join("out").to_string_lossy().into_owned();

    let embedder = Embedder::new(model.clone(), "keyword", 4);
    let answerer = Answerer::new(model, &config.llm, config.system_prompt.clone())
        .with_backoff(BackoffPolicy::immediate())
        .with_batch_pause(Duration::ZERO);

    Pipeline::from_parts(config, embedder, store, answerer).unwrap()
}

fn write_knowledge_base(dir: &TempDir) -> std::path::PathBuf {
    let kb = dir.path().join("kb");
    std::fs::create_dir_all(kb.join("hr")).unwrap();
    std::fs::write(
        kb.join("certifications.txt"),
        "Our company holds ISO 27001 certification, renewed every year by an accredited auditor.",
    )
    .unwrap();
    std::fs::write(
        kb.join("hr/people.txt"),
        "We employ 120 permanent staff across three offices.",
    )
    .unwrap();
    std::fs::write(kb.join("empty.txt"), "   \n").unwrap();
    kb
}

#[tokio::test]
async fn test_index_then_answer_questionnaire() {
    let dir = TempDir::new().unwrap();
    let kb = write_knowledge_base(&dir);
    let model = KeywordModel::new(false);
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::ephemeral(4));
    let pipeline = pipeline(model.clone(), store.clone(), &dir);

    let indexing = pipeline.index_directory(&kb).await.unwrap();
    assert_eq!(indexing.files_processed, 2);
    assert_eq!(indexing.chunks_created, 2);
    assert_eq!(indexing.vectors_stored, 2);
    assert!(indexing.errors.is_empty());
    assert_eq!(pipeline.count().await.unwrap(), 2);

    let questionnaire = dir.path().join("tender.txt");
    std::fs::write(
        &questionnaire,
        "Do you hold ISO certification?\nn/a\nHow many staff do you employ?\nWhat colour is the sky today?\n",
    )
    .unwrap();

    let report = pipeline.process_questionnaire(&questionnaire, None).await.unwrap();
    assert_eq!(report.total_questions, 3);
    assert_eq!(report.questions_answered, 2);
    assert!(report.errors.is_empty());
    assert_eq!(model.chat_calls.load(Ordering::SeqCst), 2);

    let output = dir.path().join("out").join("tender_results.json");
    assert_eq!(report.output_file, output.to_string_lossy());

    let records: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records[0]["answer"].as_str().unwrap().contains("ISO 27001"));
    assert_eq!(records[0]["confidence"], 0.8);
    assert!(records[1]["answer"].as_str().unwrap().contains("120 permanent staff"));
    assert!(records[2]["answer"].is_null());
    assert_eq!(records[2]["metadata"]["line_index"], 3);
}

#[tokio::test]
async fn test_chunks_carry_file_metadata() {
    let dir = TempDir::new().unwrap();
    let kb = write_knowledge_base(&dir);
    let store = Arc::new(MemoryStore::ephemeral(4));
    let pipeline = pipeline(KeywordModel::new(false), store.clone(), &dir);

    pipeline.index_directory(&kb).await.unwrap();

    let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 5, 0.5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].chunk.source_file.ends_with("certifications.txt"));
    assert!(hits[0].chunk.metadata.contains_key("file_size_mb"));
    assert_eq!(hits[0].chunk.metadata["chunk_type"], "single");
}

#[tokio::test]
async fn test_failed_answers_leave_questions_unanswered() {
    let dir = TempDir::new().unwrap();
    let model = KeywordModel::new(true);
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::ephemeral(4));
    let pipeline = pipeline(model.clone(), store, &dir);

    pipeline
        .index_text("Our ISO 27001 certificate is valid until 2026.", "certs")
        .await
        .unwrap();

    let mut questions = vec![
        QuestionAnswer::new("Is your ISO certificate current?"),
        QuestionAnswer::new("Do you hold ISO 9001 as well?"),
    ];
    let report = pipeline.answer_questions(&mut questions).await;

    assert_eq!(report.total_questions, 2);
    assert_eq!(report.questions_answered, 0);
    assert_eq!(model.chat_calls.load(Ordering::SeqCst), 4);
    assert!(questions.iter().all(|q| !q.is_answered()));
    assert!(questions.iter().all(|q| q.chunks_used.len() == 1));
}

#[tokio::test]
async fn test_remove_source_and_clear() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::ephemeral(4));
    let pipeline = pipeline(KeywordModel::new(false), store, &dir);

    pipeline.index_text("Public liability insurance of 5M.", "insurance.txt").await.unwrap();
    pipeline.index_text("We employ 40 staff.", "staff.txt").await.unwrap();
    assert_eq!(pipeline.indexed_sources().await.unwrap(), vec!["insurance.txt", "staff.txt"]);

    pipeline.remove_source("insurance.txt").await.unwrap();
    assert_eq!(pipeline.indexed_sources().await.unwrap(), vec!["staff.txt"]);

    pipeline.clear().await.unwrap();
    assert_eq!(pipeline.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_questionnaire_without_questions_is_an_error() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::ephemeral(4));
    let pipeline = pipeline(KeywordModel::new(false), store, &dir);

    let file = dir.path().join("blank.txt");
    std::fs::write(&file, "\n42\nnull\n").unwrap();

    assert!(pipeline.process_questionnaire(&file, None).await.is_err());
}
