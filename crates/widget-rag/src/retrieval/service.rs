//! Query-time retrieval with graceful degradation

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::index::VectorIndexManager;
use crate::providers::EmbeddingProvider;
use crate::storage::KnowledgeBaseRepository;
use crate::types::RetrievedPassage;

/// Finds the passages of a widget's completed knowledge bases closest to a query
pub struct RetrievalService {
    repository: Arc<dyn KnowledgeBaseRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndexManager>,
    default_limit: usize,
    search_timeout: Duration,
}

impl RetrievalService {
    pub fn new(
        repository: Arc<dyn KnowledgeBaseRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndexManager>,
    ) -> Self {
        Self {
            repository,
            embedder,
            index,
            default_limit: 5,
            search_timeout: Duration::from_millis(300),
        }
    }

    pub fn from_config(
        config: &RagConfig,
        repository: Arc<dyn KnowledgeBaseRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndexManager>,
    ) -> Self {
        Self::new(repository, embedder, index)
            .with_default_limit(config.retrieval.default_limit)
            .with_timeout(config.retrieval.timeout())
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_timeout(mut self, search_timeout: Duration) -> Self {
        self.search_timeout = search_timeout;
        self
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Top `limit` passages by descending score.
    ///
    /// Never fails: any error or a timeout yields an empty result and a log
    /// line. Dropping the returned future cancels in-flight provider calls.
    pub async fn search(&self, widget_id: &str, query: &str, limit: usize) -> Vec<RetrievedPassage> {
        match timeout(self.search_timeout, self.try_search(widget_id, query, limit)).await {
            Ok(Ok(passages)) => passages,
            Ok(Err(Error::CollectionNotFound(collection))) => {
                tracing::debug!(
                    "No collection {} yet for widget {}",
                    collection,
                    widget_id
                );
                Vec::new()
            }
            Ok(Err(e)) => {
                tracing::error!("Retrieval failed for widget {}: {}", widget_id, e);
                Vec::new()
            }
            Err(_) => {
                tracing::error!(
                    "Retrieval timed out for widget {} after {:?}",
                    widget_id,
                    self.search_timeout
                );
                Vec::new()
            }
        }
    }

    /// Search with the configured default limit
    pub async fn search_default(&self, widget_id: &str, query: &str) -> Vec<RetrievedPassage> {
        self.search(widget_id, query, self.default_limit).await
    }

    /// Same as `search`, but errors are returned instead of swallowed
    pub async fn try_search(
        &self,
        widget_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let completed = self.repository.list_completed_ids(widget_id).await?;
        if completed.is_empty() {
            tracing::debug!("Widget {} has no completed knowledge bases", widget_id);
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;
        let collection = self.index.collection_for(widget_id);
        let hits = self
            .index
            .search(&collection, &vector, limit, Some(completed.as_slice()))
            .await?;

        tracing::debug!(
            "Widget {}: {} passage(s) from {} knowledge base(s)",
            widget_id,
            hits.len(),
            completed.len()
        );
        Ok(hits.into_iter().map(RetrievedPassage::from).collect())
    }
}
