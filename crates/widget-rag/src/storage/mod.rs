//! Persistent storage for knowledge base records

mod database;
mod repository;

pub use database::SqliteKnowledgeBaseStore;
pub use repository::KnowledgeBaseRepository;
