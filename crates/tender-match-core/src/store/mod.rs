//! Metadata storage abstraction for Tender Match.
//!
//! The [`MetadataStore`] trait holds everything that is not a vector index
//! entry: extracted document outputs, summary embeddings, profiles, and the
//! tender records that search resolves candidates against.
//!
//! All upserts are idempotent and keyed by content hash (scoped by document
//! type) or by record id, so at-least-once delivery from a job runner is
//! safe. Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocType, DocumentOutput, Profile, SummaryEmbedding, Tender};

/// Abstract metadata backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_output`](MetadataStore::get_output) | Fetch a document output |
/// | [`upsert_output`](MetadataStore::upsert_output) | Create an output or merge references into it |
/// | [`mark_indexed`](MetadataStore::mark_indexed) | Record a successful index run |
/// | [`mark_index_failed`](MetadataStore::mark_index_failed) | Record an index failure |
/// | [`pending_outputs`](MetadataStore::pending_outputs) | Outputs not yet indexed |
/// | [`reset_indexed`](MetadataStore::reset_indexed) | Flip every output of a type back to unindexed |
/// | [`get_summary`](MetadataStore::get_summary) | Fetch a summary embedding |
/// | [`upsert_summary`](MetadataStore::upsert_summary) | Store a summary embedding |
/// | [`delete_summaries`](MetadataStore::delete_summaries) | Drop all summaries of a type |
/// | [`get_profile`](MetadataStore::get_profile) | Fetch a profile |
/// | [`upsert_profile`](MetadataStore::upsert_profile) | Store a profile |
/// | [`profiles_with_hash`](MetadataStore::profiles_with_hash) | Profiles referencing a content hash |
/// | [`get_tender`](MetadataStore::get_tender) | Fetch a tender record |
/// | [`upsert_tender`](MetadataStore::upsert_tender) | Store a tender record |
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_output(&self, doc_type: DocType, content_hash: &str)
        -> Result<Option<DocumentOutput>>;

    /// Insert an output, or merge into an existing one.
    ///
    /// An existing output keeps its text, tables and indexing state; only
    /// new `profile_ids` are appended and a missing `tender_id` is filled.
    async fn upsert_output(&self, output: &DocumentOutput) -> Result<()>;

    /// Mark an output indexed and clear any previous failure.
    async fn mark_indexed(
        &self,
        doc_type: DocType,
        content_hash: &str,
        chunk_count: usize,
        model_name: &str,
        indexed_at: i64,
    ) -> Result<()>;

    /// Mark an output unindexed and record why.
    async fn mark_index_failed(
        &self,
        doc_type: DocType,
        content_hash: &str,
        error: &str,
        failed_at: i64,
    ) -> Result<()>;

    /// Unindexed outputs of a type, ordered by content hash.
    async fn pending_outputs(
        &self,
        doc_type: DocType,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentOutput>>;

    /// Returns the number of outputs reset.
    async fn reset_indexed(&self, doc_type: DocType) -> Result<usize>;

    async fn get_summary(
        &self,
        doc_type: DocType,
        content_hash: &str,
    ) -> Result<Option<SummaryEmbedding>>;

    async fn upsert_summary(&self, summary: &SummaryEmbedding) -> Result<()>;

    /// Returns the number of summaries deleted.
    async fn delete_summaries(&self, doc_type: DocType) -> Result<usize>;

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>>;

    async fn upsert_profile(&self, profile: &Profile) -> Result<()>;

    async fn profiles_with_hash(&self, content_hash: &str) -> Result<Vec<Profile>>;

    async fn get_tender(&self, id: &str) -> Result<Option<Tender>>;

    async fn upsert_tender(&self, tender: &Tender) -> Result<()>;
}

/// Merge the references carried by `incoming` into `existing`.
///
/// Shared by store implementations so every backend treats repeated
/// uploads of the same bytes the same way.
pub fn merge_output_refs(existing: &mut DocumentOutput, incoming: &DocumentOutput) {
    for id in &incoming.profile_ids {
        if !existing.profile_ids.contains(id) {
            existing.profile_ids.push(id.clone());
        }
    }
    if existing.tender_id.is_none() {
        existing.tender_id = incoming.tender_id.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedDocument;

    #[test]
    fn test_merge_output_refs_keeps_text() {
        let mut existing = DocumentOutput::new(
            "h",
            DocType::Profile,
            ExtractedDocument {
                text: "original".into(),
                tables: vec![],
            },
        );
        existing.profile_ids.push("p1".into());

        let mut incoming = DocumentOutput::new(
            "h",
            DocType::Profile,
            ExtractedDocument {
                text: "changed".into(),
                tables: vec![],
            },
        );
        incoming.profile_ids = vec!["p1".into(), "p2".into()];

        merge_output_refs(&mut existing, &incoming);
        assert_eq!(existing.text, "original");
        assert_eq!(existing.profile_ids, vec!["p1".to_string(), "p2".to_string()]);
    }
}
