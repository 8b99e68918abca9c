//! Core data models.
//!
//! These types represent the records, chunks, and search results that flow
//! from the loader through the index to the consumer.

use serde::Serialize;

/// Extracted text of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Whitespace-trimmed, never empty.
    pub text: String,
    /// Bare file name of the source document.
    pub source: String,
}

/// A bounded slice of a [`Record`]'s text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub text: String,
    /// Inherited from the parent record.
    pub source: String,
    /// Position of this chunk within its record, starting at 0.
    pub chunk_index: i64,
}

/// A chunk returned by a similarity query, with its cosine similarity.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub score: f32,
}

/// One normalized web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}
