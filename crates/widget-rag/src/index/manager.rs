//! Vector index manager: collection lifecycle, upsert and search

use dashmap::DashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::providers::VectorStoreProvider;
use crate::retry::RetryPolicy;
use crate::types::{Chunk, DistanceMetric, VectorPayload, VectorRecord, VectorSearchResult};

use super::naming::{point_id, CollectionNamer};

/// Owns per-widget collections on top of a vector store provider
pub struct VectorIndexManager {
    store: Arc<dyn VectorStoreProvider>,
    namer: CollectionNamer,
    dimensions: usize,
    distance: DistanceMetric,
    policy: RetryPolicy,
    /// Collections known to exist
    ensured: DashSet<String>,
}

impl VectorIndexManager {
    pub fn new(
        store: Arc<dyn VectorStoreProvider>,
        namer: CollectionNamer,
        dimensions: usize,
        distance: DistanceMetric,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            namer,
            dimensions,
            distance,
            policy,
            ensured: DashSet::new(),
        }
    }

    pub fn from_config(store: Arc<dyn VectorStoreProvider>, config: &RagConfig) -> Self {
        Self::new(
            store,
            CollectionNamer::from_config(&config.vector_db),
            config.embeddings.dimensions,
            config.vector_db.distance,
            RetryPolicy::from_config(&config.retry),
        )
    }

    pub fn store(&self) -> &Arc<dyn VectorStoreProvider> {
        &self.store
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Collection holding a widget's vectors
    pub fn collection_for(&self, widget_id: &str) -> String {
        self.namer.collection_for(widget_id)
    }

    /// Create the collection if absent. Cached after the first success.
    pub async fn ensure_collection(&self, collection: &str) -> Result<()> {
        if self.ensured.contains(collection) {
            return Ok(());
        }

        let created = self
            .policy
            .run("ensure_collection", || {
                self.store
                    .ensure_collection(collection, self.dimensions, self.distance)
            })
            .await?;
        if created {
            tracing::info!(
                "Created collection {} ({} dims, {:?})",
                collection,
                self.dimensions,
                self.distance
            );
        }

        self.ensured.insert(collection.to_string());
        Ok(())
    }

    /// Build the record for one embedded chunk
    pub fn record_for(
        &self,
        knowledge_base_id: Uuid,
        chunk: &Chunk,
        vector: Vec<f32>,
    ) -> Result<VectorRecord> {
        self.check_dimensions(&vector)?;

        let mut metadata = chunk.metadata.clone();
        metadata.insert("char_start".to_string(), serde_json::json!(chunk.char_start));
        metadata.insert("char_end".to_string(), serde_json::json!(chunk.char_end));

        Ok(VectorRecord {
            id: point_id(&knowledge_base_id, chunk.chunk_index),
            vector,
            payload: VectorPayload {
                knowledge_base_id,
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
                metadata,
            },
        })
    }

    /// Insert or replace records, creating the collection on first write
    pub async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        for record in &records {
            self.check_dimensions(&record.vector)?;
        }

        self.ensure_collection(collection).await?;
        match self.upsert_with_retry(collection, &records).await {
            Err(Error::CollectionNotFound(_)) => {
                // Dropped behind our back; recreate once
                tracing::warn!("Collection {} disappeared, recreating", collection);
                self.ensured.remove(collection);
                self.ensure_collection(collection).await?;
                self.upsert_with_retry(collection, &records).await
            }
            other => other,
        }
    }

    async fn upsert_with_retry(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        self.policy
            .run("upsert", || self.store.upsert(collection, records.to_vec()))
            .await
    }

    /// Build and upsert a single chunk, returning its id
    pub async fn upsert_chunk(
        &self,
        collection: &str,
        knowledge_base_id: Uuid,
        chunk: &Chunk,
        vector: Vec<f32>,
    ) -> Result<Uuid> {
        let ids = self
            .upsert_chunks(collection, knowledge_base_id, std::slice::from_ref(chunk), vec![vector])
            .await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::internal("upsert returned no id"))
    }

    /// Build and upsert embedded chunks in one write, returning ids in input order
    pub async fn upsert_chunks(
        &self,
        collection: &str,
        knowledge_base_id: Uuid,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<Uuid>> {
        if chunks.len() != vectors.len() {
            return Err(Error::embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let records = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| self.record_for(knowledge_base_id, chunk, vector))
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        self.upsert(collection, records).await?;
        tracing::debug!(
            "Indexed {} chunk(s) of {} into {}",
            ids.len(),
            knowledge_base_id,
            collection
        );
        Ok(ids)
    }

    /// Nearest neighbours by descending score, at most `limit`.
    ///
    /// A missing collection surfaces as `Error::CollectionNotFound`.
    pub async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        knowledge_base_filter: Option<&[Uuid]>,
    ) -> Result<Vec<VectorSearchResult>> {
        self.check_dimensions(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self
            .policy
            .run("search", || {
                self.store
                    .search(collection, query, limit, knowledge_base_filter)
            })
            .await?;

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Delete points of `knowledge_base_id` beyond the `chunk_count` chunks
    /// written by the current run.
    ///
    /// Works from the index itself, so leftovers of failed or interrupted runs
    /// are found as well.
    pub async fn remove_stale(
        &self,
        collection: &str,
        knowledge_base_id: Uuid,
        chunk_count: u32,
    ) -> Result<usize> {
        let removed = match self
            .policy
            .run("delete", || {
                self.store
                    .delete_chunks_from(collection, knowledge_base_id, chunk_count)
            })
            .await
        {
            Err(Error::CollectionNotFound(_)) => 0,
            other => other?,
        };
        if removed > 0 {
            tracing::info!(
                "Removed {} stale vector(s) of {} from {}",
                removed,
                knowledge_base_id,
                collection
            );
        }
        Ok(removed)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
