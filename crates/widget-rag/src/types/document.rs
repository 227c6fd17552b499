//! Loaded documents, media types and chunks

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Metadata map attached to documents, chunks and vector payloads
pub type Metadata = HashMap<String, serde_json::Value>;

/// Supported source media types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// PDF document (paginated extraction)
    Pdf,
    /// Plain text
    PlainText,
    /// Markdown
    Markdown,
    /// HTML document
    Html,
    /// CSV file
    Csv,
    /// JSON document
    Json,
}

impl MediaType {
    /// Resolve a declared media type.
    ///
    /// Matching is case-insensitive and ignores parameters such as
    /// `; charset=utf-8`.
    pub fn parse(declared: &str) -> Result<Self> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Ok(Self::Pdf),
            "text/plain" => Ok(Self::PlainText),
            "text/markdown" | "text/x-markdown" => Ok(Self::Markdown),
            "text/html" | "application/xhtml+xml" => Ok(Self::Html),
            "text/csv" => Ok(Self::Csv),
            "application/json" => Ok(Self::Json),
            _ => Err(Error::UnsupportedMediaType(declared.to_string())),
        }
    }

    /// Canonical media type string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }

    /// Whether the format has pages
    pub fn is_paginated(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text extracted from a source, with positional metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedDocument {
    /// Extracted text
    pub text: String,
    /// Source metadata (source key, media type, page, content hash)
    pub metadata: Metadata,
}

impl LoadedDocument {
    pub fn new(text: String, metadata: Metadata) -> Self {
        Self { text, metadata }
    }

    /// Page number (1-indexed) for paginated formats
    pub fn page(&self) -> Option<u32> {
        self.metadata
            .get("page")
            .and_then(|v| v.as_u64())
            .map(|p| p as u32)
    }
}

/// A bounded passage of text, the unit of embedding and indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the chunker output; the idempotency key downstream
    pub chunk_index: u32,
    /// Text content
    pub content: String,
    /// Character offsets within the source document
    pub char_start: usize,
    pub char_end: usize,
    /// Inherited document metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parse() {
        assert_eq!(MediaType::parse("application/pdf").unwrap(), MediaType::Pdf);
        assert_eq!(
            MediaType::parse("Text/Plain; charset=utf-8").unwrap(),
            MediaType::PlainText
        );
        assert_eq!(MediaType::parse("text/markdown").unwrap(), MediaType::Markdown);
        assert!(matches!(
            MediaType::parse("application/unknown"),
            Err(Error::UnsupportedMediaType(_))
        ));
        assert!(MediaType::parse("").is_err());
    }

    #[test]
    fn test_page_metadata() {
        let mut meta = Metadata::new();
        meta.insert("page".to_string(), serde_json::json!(3));
        let doc = LoadedDocument::new("text".to_string(), meta);
        assert_eq!(doc.page(), Some(3));
    }
}
