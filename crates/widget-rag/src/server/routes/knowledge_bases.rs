//! Knowledge base registration, status and ingestion trigger

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{KnowledgeBase, MediaType, NewKnowledgeBase, StatusCounts};

/// Records of one widget with per-status counts
#[derive(Debug, Serialize)]
pub struct WidgetKnowledgeBases {
    pub widget_id: String,
    pub counts: StatusCounts,
    pub knowledge_bases: Vec<KnowledgeBase>,
}

/// Response to an accepted ingestion request
#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    pub knowledge_base_id: Uuid,
    pub accepted: bool,
}

/// POST /api/knowledge-bases - Register a pending knowledge base
pub async fn create_knowledge_base(
    State(state): State<AppState>,
    Json(request): Json<NewKnowledgeBase>,
) -> Result<(StatusCode, Json<KnowledgeBase>)> {
    for (field, value) in [
        ("widget_id", &request.widget_id),
        ("source_key", &request.source_key),
        ("media_type", &request.media_type),
    ] {
        if value.trim().is_empty() {
            return Err(Error::InvalidInput(format!("{} must not be empty", field)));
        }
    }
    // Reject early so the admin UI sees the problem at upload time
    MediaType::parse(&request.media_type)?;

    let record = state.repository().create(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/knowledge-bases/:id - Status of one knowledge base
pub async fn get_knowledge_base(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<KnowledgeBase>> {
    state
        .repository()
        .get(id)
        .await?
        .map(Json)
        .ok_or(Error::KnowledgeBaseNotFound(id))
}

/// POST /api/knowledge-bases/:id/ingest - Start ingestion in the background
pub async fn ingest_knowledge_base(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<IngestAccepted>)> {
    let record = state
        .repository()
        .get(id)
        .await?
        .ok_or(Error::KnowledgeBaseNotFound(id))?;

    // Claimed before spawning, so a concurrent run is answered with 409 here.
    // Failures are recorded on the knowledge base and logged by the orchestrator.
    let _handle = state
        .orchestrator()
        .spawn_ingest(id, record.source_key, record.media_type)?;
    tracing::info!("Queued ingestion of {}", id);

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            knowledge_base_id: id,
            accepted: true,
        }),
    ))
}

/// GET /api/widgets/:id/knowledge-bases - Records and progress counts
pub async fn list_widget_knowledge_bases(
    State(state): State<AppState>,
    Path(widget_id): Path<String>,
) -> Result<Json<WidgetKnowledgeBases>> {
    let repository = state.repository();
    let knowledge_bases = repository.list_by_widget(&widget_id).await?;
    let counts = repository.status_counts(&widget_id).await?;

    Ok(Json(WidgetKnowledgeBases {
        widget_id,
        counts,
        knowledge_bases,
    }))
}
