//! In-memory [`MetadataStore`] implementation for testing.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocType, DocumentOutput, Profile, SummaryEmbedding, Tender};

use super::{merge_output_refs, MetadataStore};

type OutputKey = (DocType, String);

/// In-memory metadata store.
pub struct InMemoryStore {
    outputs: RwLock<HashMap<OutputKey, DocumentOutput>>,
    summaries: RwLock<HashMap<OutputKey, SummaryEmbedding>>,
    profiles: RwLock<HashMap<String, Profile>>,
    tenders: RwLock<HashMap<String, Tender>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            outputs: RwLock::new(HashMap::new()),
            summaries: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            tenders: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key(doc_type: DocType, content_hash: &str) -> OutputKey {
    (doc_type, content_hash.to_string())
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn get_output(
        &self,
        doc_type: DocType,
        content_hash: &str,
    ) -> Result<Option<DocumentOutput>> {
        let outputs = self.outputs.read().unwrap();
        Ok(outputs.get(&key(doc_type, content_hash)).cloned())
    }

    async fn upsert_output(&self, output: &DocumentOutput) -> Result<()> {
        let mut outputs = self.outputs.write().unwrap();
        match outputs.get_mut(&key(output.doc_type, &output.content_hash)) {
            Some(existing) => merge_output_refs(existing, output),
            None => {
                outputs.insert(key(output.doc_type, &output.content_hash), output.clone());
            }
        }
        Ok(())
    }

    async fn mark_indexed(
        &self,
        doc_type: DocType,
        content_hash: &str,
        chunk_count: usize,
        model_name: &str,
        indexed_at: i64,
    ) -> Result<()> {
        let mut outputs = self.outputs.write().unwrap();
        if let Some(o) = outputs.get_mut(&key(doc_type, content_hash)) {
            o.indexed = true;
            o.chunk_count = chunk_count;
            o.index_model = Some(model_name.to_string());
            o.indexed_at = Some(indexed_at);
            o.index_error = None;
            o.failed_at = None;
        }
        Ok(())
    }

    async fn mark_index_failed(
        &self,
        doc_type: DocType,
        content_hash: &str,
        error: &str,
        failed_at: i64,
    ) -> Result<()> {
        let mut outputs = self.outputs.write().unwrap();
        if let Some(o) = outputs.get_mut(&key(doc_type, content_hash)) {
            o.indexed = false;
            o.index_error = Some(error.to_string());
            o.failed_at = Some(failed_at);
        }
        Ok(())
    }

    async fn pending_outputs(
        &self,
        doc_type: DocType,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentOutput>> {
        let outputs = self.outputs.read().unwrap();
        let mut pending: Vec<DocumentOutput> = outputs
            .values()
            .filter(|o| o.doc_type == doc_type && !o.indexed)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        Ok(pending)
    }

    async fn reset_indexed(&self, doc_type: DocType) -> Result<usize> {
        let mut outputs = self.outputs.write().unwrap();
        let mut count = 0;
        for o in outputs.values_mut().filter(|o| o.doc_type == doc_type) {
            o.indexed = false;
            o.chunk_count = 0;
            o.index_model = None;
            o.indexed_at = None;
            count += 1;
        }
        Ok(count)
    }

    async fn get_summary(
        &self,
        doc_type: DocType,
        content_hash: &str,
    ) -> Result<Option<SummaryEmbedding>> {
        let summaries = self.summaries.read().unwrap();
        Ok(summaries.get(&key(doc_type, content_hash)).cloned())
    }

    async fn upsert_summary(&self, summary: &SummaryEmbedding) -> Result<()> {
        let mut summaries = self.summaries.write().unwrap();
        summaries.insert(key(summary.doc_type, &summary.content_hash), summary.clone());
        Ok(())
    }

    async fn delete_summaries(&self, doc_type: DocType) -> Result<usize> {
        let mut summaries = self.summaries.write().unwrap();
        let before = summaries.len();
        summaries.retain(|(t, _), _| *t != doc_type);
        Ok(before - summaries.len())
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        Ok(self.profiles.read().unwrap().get(id).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap();
        profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn profiles_with_hash(&self, content_hash: &str) -> Result<Vec<Profile>> {
        let profiles = self.profiles.read().unwrap();
        let mut matching: Vec<Profile> = profiles
            .values()
            .filter(|p| p.content_hashes.iter().any(|h| h == content_hash))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn get_tender(&self, id: &str) -> Result<Option<Tender>> {
        Ok(self.tenders.read().unwrap().get(id).cloned())
    }

    async fn upsert_tender(&self, tender: &Tender) -> Result<()> {
        let mut tenders = self.tenders.write().unwrap();
        tenders.insert(tender.id.clone(), tender.clone());
        Ok(())
    }
}
