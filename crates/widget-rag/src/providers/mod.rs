//! Provider abstractions for embeddings, vector storage, and object storage
//!
//! Trait-based so the orchestrator and retrieval service can be wired with
//! hosted backends in production and in-process fakes in tests.

pub mod embedding;
pub mod memory;
pub mod object_store;
pub mod ollama;
pub mod openai;
pub mod vector_store;

#[cfg(feature = "qdrant")]
pub mod qdrant;

use std::sync::Arc;

use crate::config::{VectorBackend, VectorDbConfig};
use crate::error::Result;

pub use embedding::{embedder_from_config, EmbeddingProvider, RetryingEmbedder};
pub use memory::MemoryVectorStore;
pub use object_store::{LocalObjectStore, MemoryObjectStore, ObjectStore};
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;
pub use vector_store::VectorStoreProvider;

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;

/// Build the configured vector store backend
pub fn vector_store_from_config(config: &VectorDbConfig) -> Result<Arc<dyn VectorStoreProvider>> {
    match config.backend {
        VectorBackend::Memory => Ok(Arc::new(MemoryVectorStore::new())),
        #[cfg(feature = "qdrant")]
        VectorBackend::Qdrant => Ok(Arc::new(QdrantVectorStore::new(config)?)),
        #[cfg(not(feature = "qdrant"))]
        VectorBackend::Qdrant => Err(crate::error::Error::Config(
            "vector_db.backend = \"qdrant\" requires the `qdrant` feature".to_string(),
        )),
    }
}
