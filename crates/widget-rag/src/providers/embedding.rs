//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;

use crate::config::{EmbeddingBackend, RagConfig};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

use super::ollama::OllamaEmbedder;
use super::openai::OpenAiEmbedder;

/// Trait for generating text embeddings
///
/// The same provider must serve ingestion and queries, otherwise similarity
/// scores are meaningless.
///
/// Implementations:
/// - `OpenAiEmbedder`: OpenAI-compatible API (text-embedding-3-small, 1536 dims)
/// - `OllamaEmbedder`: Local Ollama server (nomic-embed-text, 768 dims)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Map a non-success HTTP status to a transient or permanent error
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> Error {
    let retryable = status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error();
    if retryable {
        Error::transient(provider, format!("HTTP {}: {}", status, body))
    } else {
        Error::embedding(format!("{} rejected request (HTTP {}): {}", provider, status, body))
    }
}

/// Map a transport error to a transient or permanent error
pub(crate) fn send_error(provider: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Error::transient(provider, err.to_string())
    } else {
        Error::embedding(format!("{} request failed: {}", provider, err))
    }
}

/// Retries transient failures and checks vector dimensionality
pub struct RetryingEmbedder<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: EmbeddingProvider> RetryingEmbedder<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        let expected = self.inner.dimensions();
        if vector.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for RetryingEmbedder<P> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .policy
            .run(self.inner.name(), || self.inner.embed(text))
            .await?;
        self.check_dimensions(&vector)?;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .policy
            .run(self.inner.name(), || self.inner.embed_batch(texts))
            .await?;
        if vectors.len() != texts.len() {
            return Err(Error::embedding(format!(
                "{} returned {} embeddings for {} inputs",
                self.inner.name(),
                vectors.len(),
                texts.len()
            )));
        }
        for vector in &vectors {
            self.check_dimensions(vector)?;
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Build the configured embedding provider with retries applied
pub fn embedder_from_config(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let policy = RetryPolicy::from_config(&config.retry);
    let provider: Arc<dyn EmbeddingProvider> = match config.embeddings.backend {
        EmbeddingBackend::Openai => Arc::new(RetryingEmbedder::new(
            OpenAiEmbedder::new(&config.embeddings)?,
            policy,
        )),
        EmbeddingBackend::Ollama => Arc::new(RetryingEmbedder::new(
            OllamaEmbedder::new(&config.embeddings)?,
            policy,
        )),
    };

    tracing::info!(
        "Embedding provider: {} ({}, {} dims)",
        provider.name(),
        config.embeddings.model,
        provider.dimensions()
    );
    Ok(provider)
}
