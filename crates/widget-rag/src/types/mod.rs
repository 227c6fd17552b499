//! Core types for the knowledge store

pub mod document;
pub mod knowledge_base;
pub mod search;

pub use document::{Chunk, LoadedDocument, MediaType, Metadata};
pub use knowledge_base::{KnowledgeBase, KnowledgeBaseStatus, NewKnowledgeBase, StatusCounts};
pub use search::{DistanceMetric, RetrievedPassage, VectorPayload, VectorRecord, VectorSearchResult};
