//! widget-rag: knowledge store for chat widgets
//!
//! Ingests uploaded documents (PDF, text, Markdown, HTML, CSV, JSON) into
//! per-widget vector collections and serves best-effort semantic retrieval
//! for the chat-response generator.
//!
//! The pipeline is load -> chunk -> embed -> index, driven per knowledge base
//! by [`processing::IngestionOrchestrator`] with its status persisted through
//! [`storage::KnowledgeBaseRepository`]. Queries go through
//! [`retrieval::RetrievalService`], which only ever returns content from
//! `completed` knowledge bases and degrades to an empty result on failure.

pub mod config;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod retry;
pub mod server;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use index::{CollectionNamer, VectorIndexManager};
pub use processing::{IngestReport, IngestionOrchestrator};
pub use retrieval::RetrievalService;
pub use types::{
    Chunk, KnowledgeBase, KnowledgeBaseStatus, LoadedDocument, NewKnowledgeBase,
    RetrievedPassage, StatusCounts,
};
