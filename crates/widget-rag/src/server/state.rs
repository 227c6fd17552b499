//! Application state for the knowledge store server

use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::index::VectorIndexManager;
use crate::ingestion::DocumentLoader;
use crate::processing::IngestionOrchestrator;
use crate::providers::{
    embedder_from_config, vector_store_from_config, EmbeddingProvider, LocalObjectStore,
    ObjectStore, VectorStoreProvider,
};
use crate::retrieval::RetrievalService;
use crate::storage::{KnowledgeBaseRepository, SqliteKnowledgeBaseStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RagConfig,
    repository: Arc<dyn KnowledgeBaseRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStoreProvider>,
    object_store: Arc<dyn ObjectStore>,
    orchestrator: Arc<IngestionOrchestrator>,
    retrieval: Arc<RetrievalService>,
}

impl AppState {
    /// Build every client from configuration
    pub fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing knowledge store state...");

        let repository = Arc::new(SqliteKnowledgeBaseStore::new(&config.storage.database_path)?);
        tracing::info!("Database opened at {:?}", config.storage.database_path);

        let object_store = Arc::new(LocalObjectStore::new(&config.storage.object_root)?);
        let embedder = embedder_from_config(&config)?;
        let vector_store = vector_store_from_config(&config.vector_db)?;
        tracing::info!("Vector store: {}", vector_store.name());

        Ok(Self::from_parts(
            config,
            repository,
            object_store,
            embedder,
            vector_store,
        ))
    }

    /// Wire state from already constructed clients
    pub fn from_parts(
        config: RagConfig,
        repository: Arc<dyn KnowledgeBaseRepository>,
        object_store: Arc<dyn ObjectStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        let index = Arc::new(VectorIndexManager::from_config(
            Arc::clone(&vector_store),
            &config,
        ));
        let loader = DocumentLoader::new(Arc::clone(&object_store), config.storage.bucket.clone());

        let orchestrator = Arc::new(IngestionOrchestrator::from_config(
            &config,
            Arc::clone(&repository),
            loader,
            Arc::clone(&embedder),
            Arc::clone(&index),
        ));
        let retrieval = Arc::new(RetrievalService::from_config(
            &config,
            Arc::clone(&repository),
            Arc::clone(&embedder),
            index,
        ));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                repository,
                embedder,
                vector_store,
                object_store,
                orchestrator,
                retrieval,
            }),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn repository(&self) -> &Arc<dyn KnowledgeBaseRepository> {
        &self.inner.repository
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedder
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStoreProvider> {
        &self.inner.vector_store
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.object_store
    }

    pub fn orchestrator(&self) -> &Arc<IngestionOrchestrator> {
        &self.inner.orchestrator
    }

    pub fn retrieval(&self) -> &Arc<RetrievalService> {
        &self.inner.retrieval
    }

    /// Check every external provider, returning `(name, reachable)` pairs
    pub async fn provider_health(&self) -> Vec<(String, bool)> {
        let embedder = self.embedder();
        let vector_store = self.vector_store();
        let object_store = self.object_store();
        let (e, v, o) = tokio::join!(
            embedder.health_check(),
            vector_store.health_check(),
            object_store.health_check()
        );
        vec![
            (embedder.name().to_string(), matches!(e, Ok(true))),
            (vector_store.name().to_string(), matches!(v, Ok(true))),
            (object_store.name().to_string(), matches!(o, Ok(true))),
        ]
    }
}
