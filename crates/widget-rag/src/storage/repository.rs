//! Knowledge base persistence trait

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{KnowledgeBase, NewKnowledgeBase, StatusCounts};

/// Durable store for knowledge base records and their status transitions.
///
/// Every `mark_*` call is a single atomic write guarded by the status state
/// machine. A transition that is not allowed from the current status fails
/// with `Error::InvalidTransition`; an unknown id with
/// `Error::KnowledgeBaseNotFound`.
#[async_trait]
pub trait KnowledgeBaseRepository: Send + Sync {
    /// Register a new record in `pending`
    async fn create(&self, new: NewKnowledgeBase) -> Result<KnowledgeBase>;

    /// Fetch a record by id
    async fn get(&self, id: Uuid) -> Result<Option<KnowledgeBase>>;

    /// Enter `processing` for the given source, clearing counters from any
    /// previous run
    async fn mark_processing(
        &self,
        id: Uuid,
        source_key: &str,
        media_type: &str,
    ) -> Result<KnowledgeBase>;

    /// Enter `completed` with the vector ids in chunk-index order
    async fn mark_completed(&self, id: Uuid, vector_ids: &[Uuid]) -> Result<KnowledgeBase>;

    /// Enter `failed` with a human-readable message
    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<KnowledgeBase>;

    /// Ids of a widget's `completed` records
    async fn list_completed_ids(&self, widget_id: &str) -> Result<Vec<Uuid>>;

    /// All records of a widget, oldest first
    async fn list_by_widget(&self, widget_id: &str) -> Result<Vec<KnowledgeBase>>;

    /// Per-status counts for a widget
    async fn status_counts(&self, widget_id: &str) -> Result<StatusCounts>;
}
