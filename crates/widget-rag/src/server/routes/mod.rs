//! API routes for the knowledge store server

pub mod knowledge_bases;
pub mod search;

use axum::{
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/knowledge-bases",
            post(knowledge_bases::create_knowledge_base),
        )
        .route("/knowledge-bases/:id", get(knowledge_bases::get_knowledge_base))
        .route(
            "/knowledge-bases/:id/ingest",
            post(knowledge_bases::ingest_knowledge_base),
        )
        .route(
            "/widgets/:id/knowledge-bases",
            get(knowledge_bases::list_widget_knowledge_bases),
        )
        .route("/widgets/:id/search", post(search::search_widget))
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "widget-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /api/knowledge-bases": "Register a knowledge base (pending)",
            "GET /api/knowledge-bases/:id": "Knowledge base status",
            "POST /api/knowledge-bases/:id/ingest": "Start ingestion (async)",
            "GET /api/widgets/:id/knowledge-bases": "Knowledge bases and status counts of a widget",
            "POST /api/widgets/:id/search": "Semantic search over completed knowledge bases"
        }
    }))
}
