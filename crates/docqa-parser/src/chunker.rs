//! Fixed-size overlapping chunker
//!
//! Windows are measured in characters and taken per page unit, so every
//! chunk keeps the source name and page it came from. A unit of `L`
//! characters with chunk size `C` and overlap `O` yields
//! `ceil((L - O) / (C - O))` chunks, or exactly one when `L <= C`.

use docqa_core::{Chunk, DocQaError, RagConfig, Result};

use crate::ParsedDocument;

/// Splits parsed documents into overlapping chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. Requires `0 < chunk_size` and `overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DocQaError::Config(
                "chunk size must be positive".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(DocQaError::Config(format!(
                "chunk overlap {overlap} must be smaller than chunk size {chunk_size}"
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Create from config
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of chunks produced for a unit of `len` characters
    pub fn expected_chunk_count(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        if len <= self.chunk_size {
            return 1;
        }
        let stride = self.chunk_size - self.overlap;
        (len - self.overlap).div_ceil(stride)
    }

    /// Split a text into `(char_offset, text)` windows
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        // Byte position of every char boundary, including the end
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = bounds.len() - 1;

        let mut windows = Vec::with_capacity(self.expected_chunk_count(len));
        if len == 0 {
            return windows;
        }

        let stride = self.chunk_size - self.overlap;
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(len);
            windows.push((start, text[bounds[start]..bounds[end]].to_string()));

            if end == len {
                break;
            }
            start += stride;
        }

        windows
    }

    /// Split a parsed document into chunks attributed to its name and pages.
    ///
    /// Fails with [`DocQaError::InvalidDocument`] if no page has text.
    pub fn split(&self, doc: &ParsedDocument) -> Result<Vec<Chunk>> {
        if !doc.has_text() {
            return Err(DocQaError::InvalidDocument {
                document: doc.name.clone(),
                reason: "no extractable text".to_string(),
            });
        }

        let mut chunks = Vec::new();
        let mut chunk_index = 0u32;

        for page in doc.pages.iter().filter(|p| !p.text.trim().is_empty()) {
            for (offset, text) in self.split_text(&page.text) {
                let mut chunk = Chunk::new(text, doc.name.clone())
                    .with_offset(offset)
                    .with_index(chunk_index);
                chunk.page = page.number;

                chunks.push(chunk);
                chunk_index += 1;
            }
        }

        tracing::debug!(
            document = %doc.name,
            pages = doc.pages.len(),
            chars = doc.char_count(),
            chunks = chunks.len(),
            "Split document into chunks"
        );

        Ok(chunks)
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}
