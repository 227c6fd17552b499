//! Vector store provider trait for storing and searching embeddings

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{DistanceMetric, VectorRecord, VectorSearchResult};

/// Trait for vector storage and similarity search
///
/// Collections are created explicitly through `ensure_collection`; every other
/// call on a missing collection fails with `Error::CollectionNotFound`.
///
/// Implementations:
/// - `MemoryVectorStore`: In-process collections
/// - `QdrantVectorStore`: Qdrant server (feature `qdrant`)
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Create the collection if it does not exist. Returns `true` when created.
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
        distance: DistanceMetric,
    ) -> Result<bool>;

    /// Insert or replace points by id
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Nearest neighbours, best first.
    ///
    /// With `knowledge_base_filter`, only points whose payload
    /// `knowledge_base_id` is in the list are considered.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        knowledge_base_filter: Option<&[Uuid]>,
    ) -> Result<Vec<VectorSearchResult>>;

    /// Delete points by id, returning how many were removed
    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<usize>;

    /// Delete every point of `knowledge_base_id` whose `chunk_index` is at
    /// least `from_chunk_index`, returning how many were removed
    async fn delete_chunks_from(
        &self,
        collection: &str,
        knowledge_base_id: Uuid,
        from_chunk_index: u32,
    ) -> Result<usize>;

    /// Number of points in the collection
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
