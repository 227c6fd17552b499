//! Knowledge store server binary
//!
//! Run with: cargo run -p widget-rag --bin widget-rag-server
//! Set `WIDGET_RAG_CONFIG` to a TOML file to override defaults.

use widget_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "widget_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("WIDGET_RAG_CONFIG") {
        Ok(path) => {
            tracing::info!("Loading configuration from {}", path);
            RagConfig::from_file(&path)?
        }
        Err(_) => {
            let mut config = RagConfig::default();
            config.apply_env();
            config.validate()?;
            config
        }
    };

    tracing::info!("Configuration loaded");
    tracing::info!(
        "  - Embeddings: {:?} {} ({} dims)",
        config.embeddings.backend,
        config.embeddings.model,
        config.embeddings.dimensions
    );
    tracing::info!("  - Vector store: {:?}", config.vector_db.backend);
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - Database: {:?}", config.storage.database_path);

    let server = RagServer::new(config)?;

    for (provider, reachable) in server.state().provider_health().await {
        if reachable {
            tracing::info!("Provider {} is reachable", provider);
        } else {
            tracing::warn!(
                "Provider {} is not reachable; ingestion will fail until it is",
                provider
            );
        }
    }

    tracing::info!("Health: http://{}/health", server.address());
    tracing::info!("API Info: http://{}/api/info", server.address());

    server.start().await?;

    Ok(())
}
