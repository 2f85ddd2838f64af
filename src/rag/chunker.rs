//! Overlapping text splitter.
//!
//! Lengths are measured in characters. Each window is cut at the strongest boundary found in
//! its tail (paragraph, line, sentence, clause, word), falling back to a hard cut when the
//! tail has none.

use serde::{Deserialize, Serialize};

use crate::core::config::ChunkingSettings;
use crate::core::errors::RagError;

const SEPARATORS: [&str; 9] = ["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " ", "\t"];

/// A slice of the source text. Offsets are byte offsets into the original string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Chunking("chunk size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Chunking(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self, RagError> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// Chunk texts only.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split(text).into_iter().map(|c| c.text).collect()
    }

    /// Splits `text` into ordered, overlapping chunks. Empty input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        // offsets[i] is the byte offset of char i; the last entry is text.len().
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = offsets.len() - 1;

        let mut chunks = Vec::new();
        if total_chars == 0 {
            return chunks;
        }

        // A boundary closer to the window start than this would stall or shrink chunks badly.
        let min_advance = (self.chunk_overlap + 1).max(self.chunk_size / 2);
        let mut start = 0;

        loop {
            let hard_end = (start + self.chunk_size).min(total_chars);
            let end = if hard_end == total_chars {
                hard_end
            } else {
                let floor = (start + min_advance).min(hard_end);
                find_boundary(text, &offsets, floor, hard_end).unwrap_or(hard_end)
            };

            // Blank windows are dropped only at the edges of the document.
            if text[offsets[start]..].trim().is_empty() {
                break;
            }
            if !text[..offsets[end]].trim().is_empty() {
                chunks.push(TextChunk {
                    text: text[offsets[start]..offsets[end]].to_string(),
                    start_offset: offsets[start],
                    end_offset: offsets[end],
                });
            }

            if end == total_chars {
                break;
            }

            let overlap_start = end.saturating_sub(self.chunk_overlap).max(start + 1);
            start = snap_to_word_start(text, &offsets, overlap_start, end);
        }

        tracing::debug!(
            "Split {} chars into {} chunks (size {}, overlap {})",
            total_chars,
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );
        chunks
    }
}

/// Char index just past the last occurrence of the strongest separator in `[floor, hard_end)`.
fn find_boundary(text: &str, offsets: &[usize], floor: usize, hard_end: usize) -> Option<usize> {
    let base = offsets[floor];
    let window = &text[base..offsets[hard_end]];
    SEPARATORS.iter().find_map(|separator| {
        window
            .rfind(separator)
            .and_then(|pos| offsets.binary_search(&(base + pos + separator.len())).ok())
    })
}

/// Moves a chunk start forward to the beginning of the next word, staying before `end`.
fn snap_to_word_start(text: &str, offsets: &[usize], start: usize, end: usize) -> usize {
    let prev_is_space = |idx: usize| {
        idx == 0
            || text[offsets[idx - 1]..offsets[idx]]
                .chars()
                .all(char::is_whitespace)
    };
    if prev_is_space(start) {
        return start;
    }
    (start + 1..end).find(|idx| prev_is_space(*idx)).unwrap_or(start)
}
