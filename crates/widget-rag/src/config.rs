//! Configuration for the knowledge store

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::DistanceMetric;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Object storage and relational store locations
    pub storage: StorageConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Vector database configuration
    pub vector_db: VectorDbConfig,
    /// Processing configuration
    pub processing: ProcessingConfig,
    /// Retry policy for transient provider failures
    pub retry: RetryConfig,
    /// Query-time configuration
    pub retrieval: RetrievalConfig,
}

impl RagConfig {
    /// Load from a TOML file; absent sections keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Fill secrets from the environment when the file leaves them out
    pub fn apply_env(&mut self) {
        if self.embeddings.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                if !key.trim().is_empty() {
                    self.embeddings.api_key = Some(key);
                }
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be > 0".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be > 0".to_string()));
        }
        if self.retrieval.default_limit == 0 {
            return Err(Error::Config("retrieval.default_limit must be > 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be > 0".to_string()));
        }
        if self.vector_db.tenant_prefix_len == 0 {
            return Err(Error::Config("vector_db.tenant_prefix_len must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store
    pub object_root: PathBuf,
    /// Bucket holding uploaded knowledge files
    pub bucket: String,
    /// SQLite database holding knowledge base records
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("widget-rag");

        Self {
            object_root: base.join("objects"),
            bucket: "knowledge".to_string(),
            database_path: base.join("knowledge.db"),
        }
    }
}

/// Embedding backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/v1/embeddings`
    #[default]
    Openai,
    /// Local Ollama server
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider
    pub backend: EmbeddingBackend,
    /// Model name
    pub model: String,
    /// Embedding dimensions; ingestion and retrieval must agree
    pub dimensions: usize,
    /// Provider base URL
    pub base_url: String,
    /// API key (OpenAI); falls back to `OPENAI_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Texts per request for batch embedding
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Openai,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 30,
            batch_size: 64,
        }
    }
}

impl EmbeddingConfig {
    /// Defaults for a local Ollama with nomic-embed-text
    pub fn ollama() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            timeout_secs: 60,
            batch_size: 32,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks
    pub chunk_overlap: usize,
    /// Prefer ending chunks on whitespace
    pub respect_word_boundaries: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            respect_word_boundaries: true,
        }
    }
}

/// Vector database backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// In-process collections
    #[default]
    Memory,
    /// Qdrant server (requires the `qdrant` feature)
    Qdrant,
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Backend
    pub backend: VectorBackend,
    /// Qdrant URL
    pub url: String,
    /// Qdrant API key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Prefix of every collection name
    pub collection_prefix: String,
    /// Characters of the tenant id used in the collection name
    pub tenant_prefix_len: usize,
    /// Similarity function
    pub distance: DistanceMetric,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Memory,
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection_prefix: "kb_".to_string(),
            tenant_prefix_len: 8,
            distance: DistanceMetric::Cosine,
        }
    }
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Concurrent embed+upsert operations per ingestion (default: CPU count, max 4)
    pub parallel_embeddings: Option<usize>,
    /// Timeout for a whole ingestion run in seconds
    pub ingest_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_embeddings: None,
            ingest_timeout_secs: 300,
        }
    }
}

impl ProcessingConfig {
    /// Effective worker pool size
    pub fn parallelism(&self) -> usize {
        self.parallel_embeddings
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }

    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest_timeout_secs)
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff_ms: u64,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Upper bound on a single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 250,
            multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

/// Query-time configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages returned when the caller gives no limit
    pub default_limit: usize,
    /// Deadline for embed + search on the chat path, in milliseconds
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            timeout_ms: 300,
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
