//! Knowledge base records and their status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Status of a knowledge base ingestion
///
/// ```text
/// pending --start--> processing --success--> completed
///                    processing --error----> failed
/// completed | failed --re-ingest--> processing
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeBaseStatus {
    /// Registered, not started
    Pending,
    /// Ingestion in flight
    Processing,
    /// All chunks indexed, visible to retrieval
    Completed,
    /// Ingestion ended with an error
    Failed,
}

impl KnowledgeBaseStatus {
    /// All statuses, in display order
    pub const ALL: [KnowledgeBaseStatus; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `processing -> processing` is allowed so a record left behind by a
    /// crashed worker can be picked up again; `processing -> pending` is not.
    pub fn can_transition_to(&self, next: KnowledgeBaseStatus) -> bool {
        use KnowledgeBaseStatus::*;
        matches!(
            (self, next),
            (Pending | Processing | Completed | Failed, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Statuses from which `next` can be entered
    pub fn sources_of(next: KnowledgeBaseStatus) -> Vec<KnowledgeBaseStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// Terminal statuses
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for KnowledgeBaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnowledgeBaseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Database(format!("Unknown status '{}'", other))),
        }
    }
}

/// One ingestion job/record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Unique record ID
    pub id: Uuid,
    /// Owning widget (tenant scope)
    pub widget_id: String,
    /// Object storage key of the source file
    pub source_key: String,
    /// Declared media type of the source
    pub media_type: String,
    /// Ingestion status
    pub status: KnowledgeBaseStatus,
    /// Number of indexed chunks (meaningful once completed)
    pub chunk_count: u32,
    /// Vector ids in chunk-index order; only trustworthy once completed
    pub vector_ids: Vec<Uuid>,
    /// Failure description (only when failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Completion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// Whether readers may use `vector_ids` and `chunk_count`
    pub fn is_searchable(&self) -> bool {
        self.status == KnowledgeBaseStatus::Completed
    }
}

/// Registration request for a new knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewKnowledgeBase {
    /// Optional caller-chosen id; generated when absent
    #[serde(default)]
    pub id: Option<Uuid>,
    pub widget_id: String,
    pub source_key: String,
    pub media_type: String,
}

impl NewKnowledgeBase {
    pub fn new(
        widget_id: impl Into<String>,
        source_key: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            widget_id: widget_id.into(),
            source_key: source_key.into(),
            media_type: media_type.into(),
        }
    }

    /// Build the pending record
    pub fn into_record(self) -> KnowledgeBase {
        let now = Utc::now();
        KnowledgeBase {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            widget_id: self.widget_id,
            source_key: self.source_key,
            media_type: self.media_type,
            status: KnowledgeBaseStatus::Pending,
            chunk_count: 0,
            vector_ids: Vec::new(),
            error_message: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-status record counts for progress display
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    /// Add `n` records of the given status
    pub fn add(&mut self, status: KnowledgeBaseStatus, n: u64) {
        match status {
            KnowledgeBaseStatus::Pending => self.pending += n,
            KnowledgeBaseStatus::Processing => self.processing += n,
            KnowledgeBaseStatus::Completed => self.completed += n,
            KnowledgeBaseStatus::Failed => self.failed += n,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}
