//! Error types for the indexing and search pipelines.

use thiserror::Error;

/// Failures that stop a single document from being indexed.
///
/// The indexer records these on the document output (error string plus a
/// failure timestamp) before returning them, so the caller only decides
/// whether to retry.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Combined text and table content was empty.
    #[error("no extractable text for {content_hash}")]
    EmptyContent { content_hash: String },
    /// The chunker produced nothing from non-empty text.
    #[error("chunker produced no chunks for {content_hash} (chunk_size={chunk_size})")]
    NoChunks {
        content_hash: String,
        chunk_size: usize,
    },
    /// The embedding backend broke its one-vector-per-input contract.
    #[error("embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch { expected: usize, actual: usize },
    /// The embedding backend returned vectors of the wrong length.
    #[error("embedding model '{model}' returned {actual}-dim vectors, expected {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },
    /// The same bytes are already attached to another tender.
    #[error("content {content_hash} is already attached to tender {existing}")]
    TenderConflict {
        content_hash: String,
        existing: String,
        requested: String,
    },
    /// The document could not be converted to text.
    #[error("conversion failed for {content_hash}: {message}")]
    Conversion {
        content_hash: String,
        message: String,
    },
    /// No document output exists and no source file was supplied.
    #[error("no document output for {content_hash}")]
    MissingOutput { content_hash: String },
    /// A profile ingest job was started without any documents.
    #[error("No documents")]
    NoDocuments,
    /// A profile ingest job entry had a blank content hash.
    #[error("Missing file hash")]
    MissingContentHash,
    /// None of the profile's documents produced a summary embedding.
    #[error("Profile embedding failed")]
    ProfileEmbedding { profile_id: String },
    #[error("profile not found: {0}")]
    ProfileNotFound(String),
    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Failures surfaced by profile-level search entry points.
///
/// A profile without an embedding is not an error: it yields no results.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("profile not found: {0}")]
    ProfileNotFound(String),
    /// The profile's ingest job failed; carries the stored error string.
    #[error("profile {id} failed: {error}")]
    ProfileFailed { id: String, error: String },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
