//! Shared fakes and wiring for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use widget_rag::config::RagConfig;
use widget_rag::error::{Error, Result};
use widget_rag::index::VectorIndexManager;
use widget_rag::ingestion::DocumentLoader;
use widget_rag::providers::{
    EmbeddingProvider, MemoryObjectStore, MemoryVectorStore, ObjectStore, VectorStoreProvider,
};
use widget_rag::storage::{KnowledgeBaseRepository, SqliteKnowledgeBaseStore};
use widget_rag::types::{
    DistanceMetric, KnowledgeBase, NewKnowledgeBase, VectorRecord, VectorSearchResult,
};
use widget_rag::{IngestionOrchestrator, RetrievalService};

pub const DIMS: usize = 64;
pub const BUCKET: &str = "knowledge";

pub fn test_config() -> RagConfig {
    let mut config = RagConfig::default();
    config.embeddings.dimensions = DIMS;
    config.storage.bucket = BUCKET.to_string();
    config.processing.parallel_embeddings = Some(4);
    config.processing.ingest_timeout_secs = 30;
    config.retry.max_attempts = 2;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    config.retrieval.timeout_ms = 2_000;
    config
}

/// Deterministic bag-of-words embedder
pub struct HashingEmbedder {
    dims: usize,
    calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dims as u64) as usize] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            vector[0] = 1.0;
        } else {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Embedder whose every call fails
pub struct FailingEmbedder {
    pub transient: bool,
    calls: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new(transient: bool) -> Self {
        Self {
            transient,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.transient {
            Err(Error::transient("failing", "HTTP 503 Service Unavailable"))
        } else {
            Err(Error::embedding("invalid input"))
        }
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Embedder that blocks until permits are released
pub struct GatedEmbedder {
    inner: HashingEmbedder,
    gate: Semaphore,
}

impl GatedEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(DIMS),
            gate: Semaphore::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::internal(e.to_string()))?;
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Vector store that is always down
pub struct FailingVectorStore;

#[async_trait]
impl VectorStoreProvider for FailingVectorStore {
    async fn ensure_collection(&self, _: &str, _: usize, _: DistanceMetric) -> Result<bool> {
        Err(Error::vector_db("connection refused"))
    }

    async fn upsert(&self, _: &str, _: Vec<VectorRecord>) -> Result<()> {
        Err(Error::vector_db("connection refused"))
    }

    async fn search(
        &self,
        _: &str,
        _: &[f32],
        _: usize,
        _: Option<&[Uuid]>,
    ) -> Result<Vec<VectorSearchResult>> {
        Err(Error::vector_db("connection refused"))
    }

    async fn delete(&self, _: &str, _: &[Uuid]) -> Result<usize> {
        Err(Error::vector_db("connection refused"))
    }

    async fn delete_chunks_from(&self, _: &str, _: Uuid, _: u32) -> Result<usize> {
        Err(Error::vector_db("connection refused"))
    }

    async fn count(&self, _: &str) -> Result<usize> {
        Err(Error::vector_db("connection refused"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Fully wired pipeline over in-process stores
pub struct Harness {
    pub config: RagConfig,
    pub repository: Arc<SqliteKnowledgeBaseStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub vectors: Arc<MemoryVectorStore>,
    pub index: Arc<VectorIndexManager>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub retrieval: RetrievalService,
}

impl Harness {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_config(test_config(), embedder)
    }

    pub fn with_config(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let repository = Arc::new(SqliteKnowledgeBaseStore::in_memory().unwrap());
        let objects = Arc::new(MemoryObjectStore::new());
        let vectors = Arc::new(MemoryVectorStore::new());

        let repo: Arc<dyn KnowledgeBaseRepository> = repository.clone();
        let store: Arc<dyn VectorStoreProvider> = vectors.clone();
        let object_store: Arc<dyn ObjectStore> = objects.clone();

        let index = Arc::new(VectorIndexManager::from_config(store, &config));
        let loader = DocumentLoader::new(object_store, BUCKET);
        let orchestrator = Arc::new(IngestionOrchestrator::from_config(
            &config,
            repo.clone(),
            loader,
            embedder.clone(),
            index.clone(),
        ));
        let retrieval = RetrievalService::from_config(&config, repo, embedder, index.clone());

        Self {
            config,
            repository,
            objects,
            vectors,
            index,
            orchestrator,
            retrieval,
        }
    }

    pub async fn put(&self, key: &str, content: &str) {
        self.objects
            .put_object(BUCKET, key, Bytes::from(content.to_string()))
            .await
            .unwrap();
    }

    pub async fn register(&self, widget_id: &str, key: &str, media_type: &str) -> KnowledgeBase {
        self.repository
            .create(NewKnowledgeBase::new(widget_id, key, media_type))
            .await
            .unwrap()
    }

    /// Store `content`, register it and ingest it to completion
    pub async fn ingest_text(&self, widget_id: &str, key: &str, content: &str) -> KnowledgeBase {
        self.put(key, content).await;
        let kb = self.register(widget_id, key, "text/plain").await;
        self.orchestrator
            .ingest(kb.id, key, "text/plain")
            .await
            .unwrap();
        self.repository.get(kb.id).await.unwrap().unwrap()
    }

    /// Move a registered record to `processing` without running the pipeline
    pub async fn start(&self, kb: &KnowledgeBase) -> KnowledgeBase {
        self.repository
            .mark_processing(kb.id, &kb.source_key, &kb.media_type)
            .await
            .unwrap()
    }

    pub async fn reload(&self, id: Uuid) -> KnowledgeBase {
        self.repository.get(id).await.unwrap().unwrap()
    }
}

/// `n` characters of distinct words
pub fn words(n: usize, seed: &str) -> String {
    let mut out = String::new();
    let mut i = 0;
    while out.chars().count() < n {
        out.push_str(&format!("{}{} ", seed, i));
        i += 1;
    }
    out.chars().take(n).collect()
}

pub fn fast_timeout() -> Duration {
    Duration::from_millis(50)
}
