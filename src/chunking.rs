//! Fixed-size overlapping text chunker.
//!
//! Lengths are counted in chars, so multi-byte text is never split inside a
//! code point. Cuts prefer whitespace in the back half of a window and fall
//! back to a hard cut at the window edge.

use crate::config::ChunkingConfig;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error(
        "Overlap {overlap} must be smaller than chunk size {chunk_size}\nSuggestion: Lower 'chunking.overlap' in settings.toml"
    )]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Splits text into overlapping chunks of at most `chunk_size` chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkerError> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into chunks, preserving order. Never returns empty chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        let chars: Vec<char> = trimmed.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }
        if chars.len() <= self.chunk_size {
            return vec![trimmed.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let window_end = (start + self.chunk_size).min(chars.len());
            let cut = if window_end == chars.len() {
                window_end
            } else {
                self.find_cut(&chars, start, window_end)
            };

            let piece: String = chars[start..cut].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if cut == chars.len() {
                break;
            }
            // cut > start + overlap, so this always advances
            start = cut - self.overlap;
        }
        chunks
    }

    /// Last whitespace in the back half of the window, else the window edge.
    fn find_cut(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        let earliest = start + (self.overlap + 1).max(self.chunk_size / 2);
        (earliest..window_end)
            .rev()
            .find(|&i| chars[i].is_whitespace())
            .unwrap_or(window_end)
    }
}
