//! Text chunking with exact character overlap

use crate::config::ChunkingConfig;
use crate::types::{Chunk, LoadedDocument};

/// Splits documents into overlapping, bounded-size chunks.
///
/// Sizes are measured in characters. Each chunk holds at most `chunk_size`
/// characters and the next chunk of the same document starts exactly
/// `overlap` characters before the previous one ended, so the last `overlap`
/// characters of chunk `i` equal the first `overlap` characters of chunk `i + 1`.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Overlap between adjacent chunks
    overlap: usize,
    /// Prefer ending a chunk right after whitespace
    respect_word_boundaries: bool,
}

impl TextChunker {
    /// Create a new chunker. `overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            respect_word_boundaries: true,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
            .with_word_boundaries(config.respect_word_boundaries)
    }

    pub fn with_word_boundaries(mut self, enabled: bool) -> Self {
        self.respect_word_boundaries = enabled;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split documents into an ordered chunk sequence.
    ///
    /// `chunk_index` is the position in the returned sequence. Overlap never
    /// spans two documents (pages).
    pub fn split(&self, documents: &[LoadedDocument]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for (document_index, doc) in documents.iter().enumerate() {
            if doc.text.trim().is_empty() {
                continue;
            }

            let offsets = char_offsets(&doc.text);
            for (char_start, char_end) in self.spans(&doc.text) {
                let content = doc.text[offsets[char_start]..offsets[char_end]].to_string();

                let mut metadata = doc.metadata.clone();
                metadata.insert(
                    "document_index".to_string(),
                    serde_json::json!(document_index),
                );

                chunks.push(Chunk {
                    chunk_index: chunks.len() as u32,
                    content,
                    char_start,
                    char_end,
                    metadata,
                });
            }
        }

        chunks
    }

    /// Character spans `[start, end)` covering `text`
    pub fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut spans = Vec::new();

        if total == 0 {
            return spans;
        }

        let mut start = 0usize;
        loop {
            let hard_end = (start + self.chunk_size).min(total);
            if hard_end == total {
                spans.push((start, total));
                break;
            }

            let end = if self.respect_word_boundaries {
                self.find_break(&chars, start, hard_end)
            } else {
                hard_end
            };

            spans.push((start, end));
            // end > start + overlap, so this always advances
            start = end - self.overlap;
        }

        spans
    }

    /// Latest position in the tail of the window that follows whitespace
    fn find_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let window = (self.chunk_size / 10).max(1);
        let lowest = (start + self.overlap + 1).max(hard_end.saturating_sub(window));

        (lowest..=hard_end)
            .rev()
            .find(|&pos| chars[pos - 1].is_whitespace())
            .unwrap_or(hard_end)
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

/// Byte offset of every char boundary, plus the end of the string
fn char_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}
