//! Ingestion orchestrator: load, chunk, embed, index, persist status

use dashmap::DashSet;
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::index::VectorIndexManager;
use crate::ingestion::{DocumentLoader, TextChunker};
use crate::providers::EmbeddingProvider;
use crate::storage::KnowledgeBaseRepository;
use crate::types::Chunk;

/// Outcome of a successful ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub knowledge_base_id: Uuid,
    pub chunk_count: u32,
    /// Vector ids in chunk-index order
    pub vector_ids: Vec<Uuid>,
    /// Points from a previous run that were deleted
    pub removed_stale: usize,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Claim on a knowledge base id; released when the run ends
struct InFlight {
    set: Arc<DashSet<Uuid>>,
    id: Uuid,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

/// Drives ingestion of one knowledge base at a time per id.
///
/// The record is moved to `processing` before any work starts and always ends
/// in `completed` or `failed` unless the process dies mid-run.
pub struct IngestionOrchestrator {
    repository: Arc<dyn KnowledgeBaseRepository>,
    loader: DocumentLoader,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndexManager>,
    parallelism: usize,
    batch_size: usize,
    run_timeout: Duration,
    in_flight: Arc<DashSet<Uuid>>,
}

impl IngestionOrchestrator {
    pub fn new(
        repository: Arc<dyn KnowledgeBaseRepository>,
        loader: DocumentLoader,
        chunker: TextChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndexManager>,
    ) -> Self {
        Self {
            repository,
            loader,
            chunker,
            embedder,
            index,
            parallelism: 4,
            batch_size: 16,
            run_timeout: Duration::from_secs(300),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Build with chunking, parallelism, batching and timeout taken from config
    pub fn from_config(
        config: &RagConfig,
        repository: Arc<dyn KnowledgeBaseRepository>,
        loader: DocumentLoader,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndexManager>,
    ) -> Self {
        let orchestrator = Self::new(
            repository,
            loader,
            TextChunker::from_config(&config.chunking),
            embedder,
            index,
        )
        .with_parallelism(config.processing.parallelism())
        .with_batch_size(config.embeddings.batch_size)
        .with_timeout(config.processing.ingest_timeout());

        tracing::info!(
            "Ingestion configured: {} parallel batches of {} chunks, {}s timeout",
            orchestrator.parallelism,
            orchestrator.batch_size,
            orchestrator.run_timeout.as_secs()
        );
        orchestrator
    }

    /// Maximum concurrent embed+upsert batches per run
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Chunks sent to the embedding provider per request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Deadline for a whole run
    pub fn with_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn repository(&self) -> &Arc<dyn KnowledgeBaseRepository> {
        &self.repository
    }

    /// Whether an ingestion for `id` is running in this process
    pub fn is_in_flight(&self, id: &Uuid) -> bool {
        self.in_flight.contains(id)
    }

    fn claim(&self, knowledge_base_id: Uuid) -> Result<InFlight> {
        if !self.in_flight.insert(knowledge_base_id) {
            return Err(Error::IngestionInFlight(knowledge_base_id));
        }
        Ok(InFlight {
            set: Arc::clone(&self.in_flight),
            id: knowledge_base_id,
        })
    }

    /// Ingest a knowledge base, persisting every status transition.
    ///
    /// `source_key` and `media_type` are stored on the record when it moves to
    /// `processing`. On failure the record is marked `failed` and the error is
    /// returned to the caller. A second call for an id that is already running
    /// is rejected with `Error::IngestionInFlight` without touching the record.
    pub async fn ingest(
        &self,
        knowledge_base_id: Uuid,
        source_key: &str,
        media_type: &str,
    ) -> Result<IngestReport> {
        let claim = self.claim(knowledge_base_id)?;
        self.ingest_claimed(claim, source_key, media_type).await
    }

    /// Claim `knowledge_base_id` and run `ingest` on a background task.
    ///
    /// The claim is taken before spawning, so a concurrent run is reported
    /// here rather than inside the task.
    pub fn spawn_ingest(
        self: &Arc<Self>,
        knowledge_base_id: Uuid,
        source_key: String,
        media_type: String,
    ) -> Result<JoinHandle<Result<IngestReport>>> {
        let claim = self.claim(knowledge_base_id)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.ingest_claimed(claim, &source_key, &media_type).await
        }))
    }

    async fn ingest_claimed(
        &self,
        claim: InFlight,
        source_key: &str,
        media_type: &str,
    ) -> Result<IngestReport> {
        let knowledge_base_id = claim.id;
        let record = self
            .repository
            .mark_processing(knowledge_base_id, source_key, media_type)
            .await?;
        tracing::info!(
            "Ingesting {} ({}, {}) for widget {}",
            knowledge_base_id,
            source_key,
            media_type,
            record.widget_id
        );

        let started = Instant::now();
        let run = self.run(knowledge_base_id, &record.widget_id, source_key, media_type);
        let outcome = match timeout(self.run_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "ingestion of {} exceeded {}s",
                knowledge_base_id,
                self.run_timeout.as_secs()
            ))),
        };

        let result = match outcome {
            Ok((vector_ids, removed_stale)) => {
                let record = self
                    .repository
                    .mark_completed(knowledge_base_id, &vector_ids)
                    .await?;
                let report = IngestReport {
                    knowledge_base_id,
                    chunk_count: record.chunk_count,
                    vector_ids,
                    removed_stale,
                    elapsed: started.elapsed(),
                };
                tracing::info!(
                    "Ingested {}: {} chunks in {:?}",
                    knowledge_base_id,
                    report.chunk_count,
                    report.elapsed
                );
                Ok(report)
            }
            Err(e) => {
                if e.is_input_error() {
                    tracing::warn!("Ingestion of {} rejected: {}", knowledge_base_id, e);
                } else {
                    tracing::error!("Ingestion of {} failed: {}", knowledge_base_id, e);
                }
                if let Err(mark_err) = self
                    .repository
                    .mark_failed(knowledge_base_id, &e.to_string())
                    .await
                {
                    tracing::error!(
                        "Could not mark {} as failed: {}",
                        knowledge_base_id,
                        mark_err
                    );
                }
                Err(e)
            }
        };
        drop(claim);
        result
    }

    /// Pipeline body; returns vector ids and the number of stale points removed
    async fn run(
        &self,
        knowledge_base_id: Uuid,
        widget_id: &str,
        source_key: &str,
        media_type: &str,
    ) -> Result<(Vec<Uuid>, usize)> {
        let documents = self.loader.load(source_key, media_type).await?;
        let chunks = self.chunker.split(&documents);
        if chunks.is_empty() {
            return Err(Error::EmptyDocument(source_key.to_string()));
        }
        tracing::info!(
            "{}: {} document(s) -> {} chunks",
            knowledge_base_id,
            documents.len(),
            chunks.len()
        );

        let collection = self.index.collection_for(widget_id);
        self.index.ensure_collection(&collection).await?;

        let semaphore = Semaphore::new(self.parallelism);
        let tasks = chunks
            .chunks(self.batch_size)
            .map(|batch| self.index_batch(&semaphore, &collection, knowledge_base_id, batch));
        // Output order follows input order, so ids line up with chunk indices
        let vector_ids: Vec<Uuid> = try_join_all(tasks).await?.into_iter().flatten().collect();

        // Anything at or past the new chunk count is left over from an earlier run
        let removed = self
            .index
            .remove_stale(&collection, knowledge_base_id, vector_ids.len() as u32)
            .await?;
        Ok((vector_ids, removed))
    }

    async fn index_batch(
        &self,
        semaphore: &Semaphore,
        collection: &str,
        knowledge_base_id: Uuid,
        batch: &[Chunk],
    ) -> Result<Vec<Uuid>> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| Error::internal(format!("Worker pool closed: {}", e)))?;

        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        self.index
            .upsert_chunks(collection, knowledge_base_id, batch, vectors)
            .await
    }
}
