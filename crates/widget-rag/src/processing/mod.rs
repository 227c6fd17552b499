//! Ingestion pipeline orchestration

mod orchestrator;

pub use orchestrator::{IngestReport, IngestionOrchestrator};
