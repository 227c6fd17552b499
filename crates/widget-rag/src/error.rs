//! Error types for the knowledge store

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::types::KnowledgeBaseStatus;

/// Result type alias for knowledge store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Knowledge store errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request from a caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No parser registered for the declared media type
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Source parsed but produced no text
    #[error("Document '{0}' contains no extractable text")]
    EmptyDocument(String),

    /// Source could not be parsed
    #[error("Failed to parse '{source_key}': {message}")]
    DocumentParse { source_key: String, message: String },

    /// Object missing from storage
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Object storage failure
    #[error("Object storage error: {0}")]
    Storage(String),

    /// Permanent embedding failure (invalid input, bad response)
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Retryable provider failure (rate limit, timeout, 5xx)
    #[error("Transient {provider} failure: {message}")]
    Transient { provider: String, message: String },

    /// Vector database error
    #[error("Vector database error: {0}")]
    VectorDb(String),

    /// Collection has not been created yet
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Vector length does not match the configured model
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Knowledge base record not found
    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(Uuid),

    /// Status change not allowed by the state machine
    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: KnowledgeBaseStatus,
        to: KnowledgeBaseStatus,
    },

    /// Another ingestion for the same knowledge base is running
    #[error("Ingestion already in flight for knowledge base {0}")]
    IngestionInFlight(Uuid),

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Relational store error
    #[error("Database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a document parse error
    pub fn document_parse(source_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DocumentParse {
            source_key: source_key.into(),
            message: message.into(),
        }
    }

    /// Create a transient provider error
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector db error
    pub fn vector_db(message: impl Into<String>) -> Self {
        Self::VectorDb(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient { .. } | Error::Timeout(_) => true,
            Error::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// Whether the failure is caused by the source document itself
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedMediaType(_)
                | Error::EmptyDocument(_)
                | Error::DocumentParse { .. }
                | Error::ObjectNotFound(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Task join error: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::BAD_REQUEST, "config_error"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type")
            }
            Error::EmptyDocument(_) | Error::DocumentParse { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "parse_error")
            }
            Error::ObjectNotFound(_) => (StatusCode::NOT_FOUND, "object_not_found"),
            Error::KnowledgeBaseNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::InvalidTransition { .. } | Error::IngestionInFlight(_) => {
                (StatusCode::CONFLICT, "conflict")
            }
            Error::Transient { .. } | Error::Timeout(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Storage(_)
            | Error::Embedding(_)
            | Error::VectorDb(_)
            | Error::CollectionNotFound(_)
            | Error::DimensionMismatch { .. }
            | Error::Database(_)
            | Error::Io(_)
            | Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
