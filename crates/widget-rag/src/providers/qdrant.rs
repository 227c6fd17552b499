//! Qdrant vector store

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, vectors_config, CollectionInfo, Condition, CountPointsBuilder,
    CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId, PointStruct,
    PointsIdsList, Range, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::config::VectorDbConfig;
use crate::error::{Error, Result};
use crate::types::{DistanceMetric, VectorPayload, VectorRecord, VectorSearchResult};

use super::vector_store::VectorStoreProvider;

/// Vector store backed by a Qdrant server
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn new(config: &VectorDbConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(key) = &config.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create Qdrant client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fail when an existing collection was created with another vector size
    async fn check_existing(&self, collection: &str, dimensions: usize) -> Result<()> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| map_error(collection, e))?;
        match info.result.as_ref().and_then(vector_size) {
            Some(size) if size as usize != dimensions => Err(Error::DimensionMismatch {
                expected: size as usize,
                actual: dimensions,
            }),
            _ => Ok(()),
        }
    }
}

fn distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Dot => Distance::Dot,
        DistanceMetric::Euclidean => Distance::Euclid,
    }
}

/// Map a client error, recognising missing collections and transport failures
fn map_error(collection: &str, err: QdrantError) -> Error {
    map_error_message(collection, &err.to_string())
}

fn map_error_message(collection: &str, message: &str) -> Error {
    if message.contains("Not found") || message.contains("doesn't exist") {
        Error::CollectionNotFound(collection.to_string())
    } else if message.contains("Unavailable")
        || message.contains("DeadlineExceeded")
        || message.contains("ResourceExhausted")
    {
        Error::transient("qdrant", message)
    } else {
        Error::vector_db(message)
    }
}

/// Another writer created the collection between our check and create
fn is_already_exists(message: &str) -> bool {
    message.contains("already exists")
}

/// Size of the single unnamed vector, if the collection has one
fn vector_size(info: &CollectionInfo) -> Option<u64> {
    let config = info
        .config
        .as_ref()?
        .params
        .as_ref()?
        .vectors_config
        .as_ref()?
        .config
        .as_ref()?;
    match config {
        vectors_config::Config::Params(params) => Some(params.size),
        vectors_config::Config::ParamsMap(_) => None,
    }
}

fn point_id(id: &Uuid) -> PointId {
    PointId::from(id.to_string())
}

fn parse_point_id(id: Option<PointId>) -> Option<Uuid> {
    match id?.point_id_options? {
        PointIdOptions::Uuid(s) => Uuid::parse_str(&s).ok(),
        PointIdOptions::Num(_) => None,
    }
}

fn to_point(record: VectorRecord) -> Result<PointStruct> {
    let json = serde_json::to_value(&record.payload)?;
    let payload = Payload::try_from(json).map_err(|e| Error::vector_db(e.to_string()))?;
    Ok(PointStruct::new(point_id(&record.id), record.vector, payload))
}

#[async_trait]
impl VectorStoreProvider for QdrantVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<bool> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| map_error(collection, e))?;
        if exists {
            self.check_existing(collection, dimensions).await?;
            return Ok(false);
        }

        let created = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, distance(metric))),
            )
            .await;
        match created {
            Ok(_) => {
                tracing::info!("Created Qdrant collection {} ({} dims)", collection, dimensions);
                Ok(true)
            }
            Err(e) if is_already_exists(&e.to_string()) => {
                tracing::debug!("Collection {} was created concurrently", collection);
                self.check_existing(collection, dimensions).await?;
                Ok(false)
            }
            Err(e) => Err(map_error(collection, e)),
        }
    }

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let points = records
            .into_iter()
            .map(to_point)
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        knowledge_base_filter: Option<&[Uuid]>,
    ) -> Result<Vec<VectorSearchResult>> {
        let mut request =
            SearchPointsBuilder::new(collection, query.to_vec(), limit as u64).with_payload(true);
        if let Some(ids) = knowledge_base_filter {
            let keywords: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            request = request.filter(Filter::must([Condition::matches(
                "knowledge_base_id",
                keywords,
            )]));
        }

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| map_error(collection, e))?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let Some(id) = parse_point_id(point.id) else {
                tracing::warn!("Skipping point with non-UUID id in {}", collection);
                continue;
            };
            let json: serde_json::Map<String, JsonValue> = point
                .payload
                .into_iter()
                .map(|(k, v)| (k, v.into_json()))
                .collect();
            match serde_json::from_value::<VectorPayload>(JsonValue::Object(json)) {
                Ok(payload) => hits.push(VectorSearchResult {
                    id,
                    score: point.score,
                    payload,
                }),
                Err(e) => tracing::warn!("Skipping point {} with bad payload: {}", id, e),
            }
        }
        Ok(hits)
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let list = PointsIdsList {
            ids: ids.iter().map(point_id).collect(),
        };
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(list).wait(true))
            .await
            .map_err(|e| map_error(collection, e))?;
        // Qdrant does not report how many of the ids existed
        Ok(ids.len())
    }

    async fn delete_chunks_from(
        &self,
        collection: &str,
        knowledge_base_id: Uuid,
        from_chunk_index: u32,
    ) -> Result<usize> {
        let filter = Filter::must([
            Condition::matches("knowledge_base_id", knowledge_base_id.to_string()),
            Condition::range(
                "chunk_index",
                Range {
                    gte: Some(from_chunk_index as f64),
                    ..Default::default()
                },
            ),
        ]);

        let counted = self
            .client
            .count(
                CountPointsBuilder::new(collection)
                    .filter(filter.clone())
                    .exact(true),
            )
            .await
            .map_err(|e| map_error(collection, e))?;
        let stale = counted.result.map(|r| r.count as usize).unwrap_or(0);
        if stale == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(filter).wait(true))
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(stale)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.client.health_check().await.is_ok())
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
