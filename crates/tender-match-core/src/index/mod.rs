//! Vector index abstraction.
//!
//! A [`VectorIndex`] is a named collection of embedded chunks in cosine
//! space. Tender Match keeps two of them, one for tender chunks and one for
//! profile chunks, and the indexer and search engine talk to both only
//! through this trait.
//!
//! Implementations must be `Send + Sync`; upserts and queries may run
//! concurrently, with last-write-wins on an id.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EmbeddingMetadata, IndexEntry};

/// A nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    /// The chunk text stored with the entry.
    pub document: String,
    pub metadata: EmbeddingMetadata,
    /// Cosine distance, `1 - cosine_similarity`.
    pub distance: f64,
}

impl IndexHit {
    pub fn similarity(&self) -> f64 {
        similarity_from_distance(self.distance)
    }
}

/// Convert a cosine distance into a similarity clamped at zero.
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance).max(0.0)
}

/// Abstract vector collection.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or overwrite entries by id |
/// | [`query`](VectorIndex::query) | Nearest neighbours by ascending distance |
/// | [`clear`](VectorIndex::clear) | Drop every entry in the collection |
/// | [`count`](VectorIndex::count) | Number of stored entries |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Collection name. Collections persist across restarts under this name.
    fn name(&self) -> &str;

    /// Insert or overwrite entries. Idempotent by id.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Return up to `n_results` hits ordered by ascending cosine distance.
    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<IndexHit>>;

    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_from_distance() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert!((similarity_from_distance(0.25) - 0.75).abs() < 1e-12);
        assert_eq!(similarity_from_distance(1.4), 0.0);
    }
}
