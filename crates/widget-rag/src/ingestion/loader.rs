//! Document loader: object storage fetch + media-type parsing

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::ObjectStore;
use crate::types::{LoadedDocument, MediaType};
use crate::types::document::Metadata;

use super::parser::FileParser;

/// Fetches a source from object storage and extracts its text
#[derive(Clone)]
pub struct DocumentLoader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl DocumentLoader {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Load `source_key` and return one document per non-empty page.
    ///
    /// The media type is checked before anything is fetched. The whole object
    /// is buffered in memory; size limits are enforced by the uploader.
    pub async fn load(&self, source_key: &str, media_type: &str) -> Result<Vec<LoadedDocument>> {
        let media = MediaType::parse(media_type)?;

        let data = self.store.get_object(&self.bucket, source_key).await?;
        tracing::debug!(
            "[{}] Fetched {} bytes from {} ({})",
            source_key,
            data.len(),
            self.store.name(),
            media
        );

        let key = source_key.to_string();
        let parsed = tokio::task::spawn_blocking(move || FileParser::parse(media, &key, &data))
            .await
            .map_err(|e| Error::document_parse(source_key, format!("Parser crashed: {}", e)))??;

        if !parsed.has_text() {
            return Err(Error::EmptyDocument(source_key.to_string()));
        }

        let documents: Vec<LoadedDocument> = parsed
            .pages
            .into_iter()
            .filter(|page| !page.content.trim().is_empty())
            .map(|page| {
                let mut metadata = Metadata::new();
                metadata.insert("source_key".to_string(), serde_json::json!(source_key));
                metadata.insert("media_type".to_string(), serde_json::json!(media.as_str()));
                metadata.insert(
                    "content_hash".to_string(),
                    serde_json::json!(parsed.content_hash),
                );
                if let Some(page_number) = page.page_number {
                    metadata.insert("page".to_string(), serde_json::json!(page_number));
                }
                if let Some(total) = parsed.total_pages {
                    metadata.insert("total_pages".to_string(), serde_json::json!(total));
                }
                LoadedDocument::new(page.content, metadata)
            })
            .collect();

        tracing::info!(
            "[{}] Loaded {} document part(s) as {}",
            source_key,
            documents.len(),
            media
        );

        Ok(documents)
    }
}
