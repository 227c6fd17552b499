//! Deterministic collection names and point ids

use uuid::Uuid;

use crate::config::VectorDbConfig;

/// Namespace for point ids (UUID v5 over `"{knowledge_base_id}:{chunk_index}"`)
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x6a1c_4f0e_93d2_5b7a_8e41_c2d9_07f3_b15e);

/// Id of the vector for one chunk of a knowledge base.
///
/// Stable across runs, so re-ingestion overwrites instead of duplicating.
pub fn point_id(knowledge_base_id: &Uuid, chunk_index: u32) -> Uuid {
    let name = format!("{}:{}", knowledge_base_id, chunk_index);
    Uuid::new_v5(&POINT_NAMESPACE, name.as_bytes())
}

/// Maps a widget id to the collection holding its vectors.
///
/// The name depends only on the widget, so ingestion and retrieval agree on
/// the collection without a lookup table.
#[derive(Debug, Clone)]
pub struct CollectionNamer {
    prefix: String,
    tenant_len: usize,
}

impl CollectionNamer {
    pub fn new(prefix: impl Into<String>, tenant_len: usize) -> Self {
        Self {
            prefix: prefix.into(),
            tenant_len: tenant_len.max(1),
        }
    }

    pub fn from_config(config: &VectorDbConfig) -> Self {
        Self::new(config.collection_prefix.clone(), config.tenant_prefix_len)
    }

    /// Collection name for a widget: prefix plus the first characters of the
    /// id, lowercased, with anything outside `[a-z0-9]` replaced by `_`.
    pub fn collection_for(&self, widget_id: &str) -> String {
        let tenant: String = widget_id
            .trim()
            .chars()
            .take(self.tenant_len)
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();

        if tenant.is_empty() {
            format!("{}default", self.prefix)
        } else {
            format!("{}{}", self.prefix, tenant)
        }
    }
}

impl Default for CollectionNamer {
    fn default() -> Self {
        Self::from_config(&VectorDbConfig::default())
    }
}
