//! In-process vector store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{DistanceMetric, VectorRecord, VectorSearchResult};

use super::vector_store::VectorStoreProvider;

struct Collection {
    dimensions: usize,
    distance: DistanceMetric,
    points: HashMap<Uuid, VectorRecord>,
}

/// Brute-force vector store kept in memory
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of existing collections, sorted
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Fetch a point by id
    pub fn get(&self, collection: &str, id: &Uuid) -> Option<VectorRecord> {
        self.collections
            .read()
            .get(collection)
            .and_then(|c| c.points.get(id).cloned())
    }
}

#[async_trait]
impl VectorStoreProvider for MemoryVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
        distance: DistanceMetric,
    ) -> Result<bool> {
        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(collection) {
            if existing.dimensions != dimensions {
                return Err(Error::DimensionMismatch {
                    expected: existing.dimensions,
                    actual: dimensions,
                });
            }
            return Ok(false);
        }

        collections.insert(
            collection.to_string(),
            Collection {
                dimensions,
                distance,
                points: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        // Validate the whole batch before touching the collection
        if let Some(bad) = records.iter().find(|r| r.vector.len() != target.dimensions) {
            return Err(Error::DimensionMismatch {
                expected: target.dimensions,
                actual: bad.vector.len(),
            });
        }

        for record in records {
            target.points.insert(record.id, record);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        knowledge_base_filter: Option<&[Uuid]>,
    ) -> Result<Vec<VectorSearchResult>> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        if query.len() != target.dimensions {
            return Err(Error::DimensionMismatch {
                expected: target.dimensions,
                actual: query.len(),
            });
        }

        let allowed: Option<HashSet<Uuid>> =
            knowledge_base_filter.map(|ids| ids.iter().copied().collect());

        let mut hits: Vec<VectorSearchResult> = target
            .points
            .values()
            .filter(|r| {
                allowed
                    .as_ref()
                    .map_or(true, |a| a.contains(&r.payload.knowledge_base_id))
            })
            .map(|r| VectorSearchResult {
                id: r.id,
                score: target.distance.score(query, &r.vector),
                payload: r.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<usize> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Ok(ids
            .iter()
            .filter(|id| target.points.remove(id).is_some())
            .count())
    }

    async fn delete_chunks_from(
        &self,
        collection: &str,
        knowledge_base_id: Uuid,
        from_chunk_index: u32,
    ) -> Result<usize> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        let before = target.points.len();
        target.points.retain(|_, r| {
            r.payload.knowledge_base_id != knowledge_base_id
                || r.payload.chunk_index < from_chunk_index
        });
        Ok(before - target.points.len())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.points.len())
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
