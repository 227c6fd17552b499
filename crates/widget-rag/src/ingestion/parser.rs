//! Media-type specific text extraction

use pulldown_cmark::{Event, Parser as MarkdownParser, TagEnd};
use regex::Regex;
use scraper::Html;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::MediaType;

/// Parsed document with extracted text per page
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Media type the parser ran for
    pub media_type: MediaType,
    /// Extracted text, one entry per page (a single entry for unpaginated formats)
    pub pages: Vec<PageContent>,
    /// Total pages (if applicable)
    pub total_pages: Option<u32>,
    /// SHA-256 over all extracted text
    pub content_hash: String,
}

impl ParsedDocument {
    fn new(media_type: MediaType, pages: Vec<PageContent>, total_pages: Option<u32>) -> Self {
        let mut hasher = Sha256::new();
        for page in &pages {
            hasher.update(page.content.as_bytes());
        }
        Self {
            media_type,
            pages,
            total_pages,
            content_hash: hex::encode(hasher.finalize()),
        }
    }

    fn single(media_type: MediaType, content: String) -> Self {
        Self::new(
            media_type,
            vec![PageContent {
                page_number: None,
                content,
            }],
            None,
        )
    }

    /// Whether any page carries non-whitespace text
    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|p| !p.content.trim().is_empty())
    }
}

/// Content from a single page
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Page number (1-indexed) for paginated formats
    pub page_number: Option<u32>,
    /// Text content of the page
    pub content: String,
}

/// Multi-format parser
pub struct FileParser;

impl FileParser {
    /// Parse a fully buffered source according to its media type
    pub fn parse(media_type: MediaType, source_key: &str, data: &[u8]) -> Result<ParsedDocument> {
        match media_type {
            MediaType::Pdf => Self::parse_pdf(source_key, data),
            MediaType::PlainText => Ok(ParsedDocument::single(
                media_type,
                normalize_text(&decode_utf8(source_key, data)),
            )),
            MediaType::Markdown => Self::parse_markdown(source_key, data),
            MediaType::Html => Self::parse_html(source_key, data),
            MediaType::Csv => Self::parse_csv(source_key, data),
            MediaType::Json => Self::parse_json(source_key, data),
        }
    }

    /// Page-by-page extraction with lopdf, falling back to pdf-extract
    fn parse_pdf(source_key: &str, data: &[u8]) -> Result<ParsedDocument> {
        let doc = match lopdf::Document::load_mem(data) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("[{}] lopdf could not load PDF ({}), trying pdf-extract", source_key, e);
                return Self::parse_pdf_whole(source_key, data, None);
            }
        };

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let total_pages = page_numbers.len() as u32;
        let mut pages = Vec::with_capacity(page_numbers.len());

        for page_number in page_numbers {
            match doc.extract_text(&[page_number]) {
                Ok(text) => {
                    let content = cleanup_pdf_text(&text);
                    if !content.is_empty() {
                        pages.push(PageContent {
                            page_number: Some(page_number),
                            content,
                        });
                    }
                }
                Err(e) => {
                    tracing::debug!("[{}] Could not extract page {}: {}", source_key, page_number, e);
                }
            }
        }

        if pages.is_empty() {
            tracing::warn!(
                "[{}] Per-page extraction produced no text ({} pages), trying pdf-extract",
                source_key,
                total_pages
            );
            return Self::parse_pdf_whole(source_key, data, Some(total_pages));
        }

        Ok(ParsedDocument::new(MediaType::Pdf, pages, Some(total_pages)))
    }

    fn parse_pdf_whole(
        source_key: &str,
        data: &[u8],
        total_pages: Option<u32>,
    ) -> Result<ParsedDocument> {
        let text = pdf_extract::extract_text_from_mem(data)
            .map_err(|e| Error::document_parse(source_key, format!("PDF extraction failed: {}", e)))?;

        let content = cleanup_pdf_text(&text);
        let pages = vec![PageContent {
            page_number: None,
            content,
        }];
        Ok(ParsedDocument::new(MediaType::Pdf, pages, total_pages))
    }

    fn parse_markdown(source_key: &str, data: &[u8]) -> Result<ParsedDocument> {
        let raw = decode_utf8(source_key, data);
        let mut text = String::with_capacity(raw.len());

        for event in MarkdownParser::new(&raw) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak | Event::HardBreak => text.push('\n'),
                Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock
                    | TagEnd::TableRow,
                ) => text.push('\n'),
                Event::End(TagEnd::TableCell) => text.push(' '),
                _ => {}
            }
        }

        Ok(ParsedDocument::single(MediaType::Markdown, normalize_text(&text)))
    }

    fn parse_html(source_key: &str, data: &[u8]) -> Result<ParsedDocument> {
        let raw = decode_utf8(source_key, data);
        let document = Html::parse_document(&raw);
        let mut text = String::with_capacity(raw.len() / 2);

        for node in document.root_element().descendants() {
            let Some(fragment) = node.value().as_text() else {
                continue;
            };
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
                .map(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"))
                .unwrap_or(false);
            if hidden {
                continue;
            }
            let fragment = fragment.trim();
            if !fragment.is_empty() {
                text.push_str(fragment);
                text.push('\n');
            }
        }

        Ok(ParsedDocument::single(MediaType::Html, normalize_text(&text)))
    }

    fn parse_csv(source_key: &str, data: &[u8]) -> Result<ParsedDocument> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut lines = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| Error::document_parse(source_key, format!("Invalid CSV: {}", e)))?;
            let line = record
                .iter()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            if !line.is_empty() {
                lines.push(line);
            }
        }

        Ok(ParsedDocument::single(MediaType::Csv, lines.join("\n")))
    }

    fn parse_json(source_key: &str, data: &[u8]) -> Result<ParsedDocument> {
        let value: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| Error::document_parse(source_key, format!("Invalid JSON: {}", e)))?;
        let text = serde_json::to_string_pretty(&value)?;
        Ok(ParsedDocument::single(MediaType::Json, text))
    }
}

/// Decode UTF-8, replacing invalid sequences and dropping a BOM
fn decode_utf8(source_key: &str, data: &[u8]) -> String {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(s) => s.to_string(),
        Err(e) => {
            tracing::warn!("[{}] Invalid UTF-8 at byte {}, decoding lossily", source_key, e.valid_up_to());
            String::from_utf8_lossy(data).into_owned()
        }
    }
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

fn inline_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\u{00A0}]+").expect("valid regex"))
}

/// Normalize line endings and collapse runs of blank lines
fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n").replace('\0', "");
    blank_lines().replace_all(text.trim(), "\n\n").into_owned()
}

/// Clean extracted PDF text: ligatures, odd spaces, blank lines
fn cleanup_pdf_text(text: &str) -> String {
    let text = text
        .replace('\0', "")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace('\u{2010}', "-")
        .replace('\u{2011}', "-");

    text.lines()
        .map(|l| inline_space().replace_all(l.trim(), " ").into_owned())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
