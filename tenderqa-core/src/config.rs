use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole answering pipeline.
///
/// Built once (from YAML or defaults) and handed to each component's
/// constructor. Nothing reads configuration from ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// Which HTTP dialect a model endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/v1/...` endpoints (LM Studio, vLLM, llama.cpp server)
    OpenAi,
    /// Ollama native `/api/...` endpoints
    Ollama,
}

/// Configuration for the answering model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Upper bound for a single completion request
    pub timeout_secs: u64,
    /// Attempts per question before giving up on it
    pub max_retries: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Pause between consecutive questions in batch mode
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

/// Delays used between answer attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base of the exponential delay applied after a timeout
    pub base_delay_ms: u64,
    /// Flat delay applied after a transport error
    pub fixed_delay_ms: u64,
}

/// Configuration for the embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    /// Fallback dimension when the model cannot be probed
    pub dimension: usize,
    /// Upper bound for a single embedding request
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for retrieval: chunking and similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub similarity_threshold: f32,
    pub max_similar_chunks: usize,
    #[serde(default)]
    pub indexer: IndexerConfig,
}

/// Configuration for file collection behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// File extensions to index (e.g., ["txt", "md"])
    /// Empty list (default) means index all readable text files
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Names to exclude - skips any directory/file whose name equals one of these
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Name prefixes to exclude (e.g. "~$" for Office lock files)
    #[serde(default = "default_exclude_prefixes")]
    pub exclude_prefixes: Vec<String>,
}

fn default_exclude_patterns() -> Vec<String> {
    crate::patterns::default_exclude_patterns()
}

fn default_exclude_prefixes() -> Vec<String> {
    crate::patterns::default_exclude_prefixes()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_llm_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_embedding_provider() -> ProviderKind {
    ProviderKind::Ollama
}

fn default_batch_pause_ms() -> u64 {
    500
}

fn default_system_prompt() -> String {
    "You are an assistant specialised in answering calls for tenders.\n\
     Answer precisely and professionally, using only the information provided in the context.\n\
     Respond ONLY with a JSON object in the following format:\n\
     {\n    \"answer\": \"Content of the answer\",\n    \"confidence\": 0.85,\n    \"sources\": [\"source1\", \"source2\"]\n}"
        .to_string()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
            exclude_prefixes: default_exclude_prefixes(),
        }
    }
}

/// Vector database storage mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum StorageMode {
    /// In-process index; snapshotted to `path` on every commit when set
    Embedded { path: Option<String> },
    /// Remote vector database reached over gRPC
    Grpc { url: String },
}

impl Default for StorageMode {
    fn default() -> Self {
        Self::Embedded {
            path: Some("./data/tenderqa_index.json".to_string()),
        }
    }
}

/// Storage configuration for the vector index and produced answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub storage_mode: StorageMode,
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    /// Directory receiving one `<stem>_results.json` per processed questionnaire
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

/// Vector database configuration (collection/index name, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    pub collection_name: String,
}

fn default_output_path() -> String {
    "./output".to_string()
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            collection_name: "tender_knowledge_base".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::default(),
            vector_db: VectorDbConfig::default(),
            output_path: default_output_path(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            fixed_delay_ms: 1000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: "http://localhost:1234".to_string(),
            model: "mistralai/mistral-7b-instruct-v0.3".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 3,
            retry: RetryConfig::default(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dimension: 384,
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            similarity_threshold: 0.8,
            max_similar_chunks: 5,
            indexer: IndexerConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            rag: RagConfig::default(),
            storage: StorageConfig::default(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the numeric invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        let rag = &self.rag;
        if rag.chunk_size == 0 {
            return Err(ConfigError::Invalid("rag.chunk_size must be positive".into()));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&rag.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "rag.similarity_threshold must be within [0, 1], got {}",
                rag.similarity_threshold
            )));
        }
        if rag.max_similar_chunks == 0 {
            return Err(ConfigError::Invalid("rag.max_similar_chunks must be positive".into()));
        }
        if self.llm.max_retries == 0 {
            return Err(ConfigError::Invalid("llm.max_retries must be at least 1".into()));
        }
        if self.llm.timeout_secs == 0 || self.embedding.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding.dimension must be positive".into()));
        }
        Ok(())
    }
}
