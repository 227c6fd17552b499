//! Widget search endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::RetrievedPassage;

const MAX_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Defaults to the configured retrieval limit
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RetrievedPassage>,
    pub processing_time_ms: u64,
}

/// POST /api/widgets/:id/search - Best-effort semantic search
pub async fn search_widget(
    State(state): State<AppState>,
    Path(widget_id): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    let retrieval = state.retrieval();
    let limit = request.limit.unwrap_or_else(|| retrieval.default_limit());
    if limit > MAX_LIMIT {
        return Err(Error::InvalidInput(format!(
            "limit must be at most {}",
            MAX_LIMIT
        )));
    }

    let results = retrieval.search(&widget_id, &request.query, limit).await;

    Ok(Json(SearchResponse {
        results,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
