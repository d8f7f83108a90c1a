//! Fixed-size, overlapping text chunking.
//!
//! Sizes and offsets are measured in characters (Unicode scalar values), so a
//! chunk boundary never splits a code point. For a text of `L` characters with
//! size `S` and overlap `O` (`O < S`, `L > S`) the chunker emits
//! `⌈(L − O) / (S − O)⌉` chunks; a non-empty text of at most `S` characters is
//! a single chunk and an empty text yields none.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, validate_chunking};

/// A contiguous slice of a document's text. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub index: usize,
    pub text: String,
    /// First character of the chunk (inclusive).
    pub char_start: usize,
    /// One past the last character of the chunk.
    pub char_end: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// Chunking parameters, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Number of chunks [`Chunker::chunk`] produces for `char_len` characters.
    pub fn expected_chunks(&self, char_len: usize) -> usize {
        if char_len == 0 {
            return 0;
        }
        if char_len <= self.chunk_size {
            return 1;
        }
        (char_len - self.chunk_overlap).div_ceil(self.stride())
    }

    /// Splits `text` into overlapping chunks owned by `document_id`.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        // Byte offset of every character start, plus the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        let mut chunks = Vec::with_capacity(self.expected_chunks(char_len));
        if char_len == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(char_len);
            chunks.push(Chunk {
                document_id: document_id.to_string(),
                index: chunks.len(),
                text: text[boundaries[start]..boundaries[end]].to_string(),
                char_start: start,
                char_end: end,
            });

            if end == char_len {
                break;
            }
            start += self.stride();
        }

        chunks
    }
}

/// Convenience wrapper around [`Chunker`].
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ConfigError> {
    Ok(Chunker::new(chunk_size, chunk_overlap)?.chunk(document_id, text))
}
