use crate::answer::LlmResponse;
use crate::rag::{Chunk, EmbeddingVector, Metadata};
use serde::{Deserialize, Serialize};

/// One questionnaire question and, once processed, its grounded answer.
///
/// Created per extracted question and filled in by the query phase: the
/// embedding first, then the chunks retrieved for it, then the answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_embedding: Option<EmbeddingVector>,
    #[serde(default)]
    pub chunks_used: Vec<Chunk>,
    pub answer: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl QuestionAnswer {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }

    /// Records a successful answer.
    pub fn apply(&mut self, response: LlmResponse) {
        self.answer = Some(response.answer);
        self.confidence = Some(response.confidence);
        self.sources = response.sources;
    }

    pub fn to_record(&self) -> AnswerRecord {
        AnswerRecord {
            question: self.question.clone(),
            answer: self.answer.clone(),
            confidence: self.confidence,
            sources: self.sources.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// The persisted shape of one answered (or unanswered) question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: Option<String>,
    pub confidence: Option<f64>,
    pub sources: Vec<String>,
    pub metadata: Metadata,
}

/// Summary of a knowledge-base indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingReport {
    pub files_processed: usize,
    pub chunks_created: usize,
    pub vectors_stored: usize,
    pub elapsed_secs: f64,
    pub errors: Vec<String>,
}

/// Summary of answering one questionnaire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub input_file: String,
    pub output_file: String,
    pub total_questions: usize,
    pub questions_answered: usize,
    pub elapsed_secs: f64,
    pub errors: Vec<String>,
}
