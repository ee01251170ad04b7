//! In-memory [`VectorIndex`] for tests and single-process use.
//!
//! Entries live in a `BTreeMap` behind `std::sync::RwLock`. Queries are a
//! brute-force cosine scan over every stored vector.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::IndexEntry;

use super::{IndexHit, VectorIndex};

/// In-memory vector collection.
pub struct InMemoryIndex {
    name: String,
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut stored = self.entries.write().unwrap();
        for entry in entries {
            stored.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<IndexHit>> {
        if n_results == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.entries.read().unwrap();
        let mut hits: Vec<IndexHit> = stored
            .values()
            .map(|entry| IndexHit {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                distance: 1.0 - cosine_similarity(embedding, &entry.embedding) as f64,
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().unwrap().clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{entry_id, DocType, EmbeddingMetadata};

    fn entry(hash: &str, i: usize, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: entry_id(DocType::Tender, hash, i),
            document: format!("chunk {} of {}", i, hash),
            embedding,
            metadata: EmbeddingMetadata {
                doc_type: DocType::Tender,
                content_hash: hash.to_string(),
                tender_id: Some(format!("t-{}", hash)),
                chunk_index: i,
                model_name: "test".into(),
                chunk_size: 500,
                chunk_overlap: 80,
                source: None,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_id() {
        let index = InMemoryIndex::new("tenders");
        let batch = vec![entry("a", 0, vec![1.0, 0.0]), entry("a", 1, vec![0.0, 1.0])];
        index.upsert(&batch).await.unwrap();
        index.upsert(&batch).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
        let hits = index.query(&[1.0, 0.0], 5).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["tender:a:0", "tender:a:1"]);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let index = InMemoryIndex::new("tenders");
        index
            .upsert(&[
                entry("far", 0, vec![0.0, 1.0]),
                entry("near", 0, vec![1.0, 0.0]),
                entry("mid", 0, vec![0.6, 0.8]),
            ])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.content_hash, "near");
        assert_eq!(hits[1].metadata.content_hash, "mid");
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].similarity() - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_clear() {
        let index = InMemoryIndex::new("profiles");
        index.upsert(&[entry("a", 0, vec![1.0])]).await.unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.query(&[1.0], 5).await.unwrap().is_empty());
    }
}
