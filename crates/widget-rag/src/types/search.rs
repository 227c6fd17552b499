//! Vector records and search results

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Metadata;

/// Similarity function used by a collection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    Euclidean,
}

impl DistanceMetric {
    /// Similarity score between two equal-length vectors, higher is more similar
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    0.0
                } else {
                    dot / (na * nb)
                }
            }
            Self::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::Euclidean => {
                let dist: f32 = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + dist)
            }
        }
    }
}

/// Payload stored next to each vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPayload {
    pub knowledge_base_id: Uuid,
    pub chunk_index: u32,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A point in the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Deterministic id derived from (knowledge base id, chunk index)
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// Search hit from the vector store
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub id: Uuid,
    /// Similarity score, higher is more similar
    pub score: f32,
    pub payload: VectorPayload,
}

/// Passage returned to the chat-response generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub score: f32,
    pub content: String,
    pub metadata: Metadata,
}

impl From<VectorSearchResult> for RetrievedPassage {
    fn from(hit: VectorSearchResult) -> Self {
        let mut metadata = hit.payload.metadata;
        metadata.insert(
            "knowledge_base_id".to_string(),
            serde_json::json!(hit.payload.knowledge_base_id.to_string()),
        );
        metadata.insert(
            "chunk_index".to_string(),
            serde_json::json!(hit.payload.chunk_index),
        );
        Self {
            score: hit.score,
            content: hit.payload.content,
            metadata,
        }
    }
}
