//! Document indexing pipeline.
//!
//! Turns one extracted document into chunk entries in a vector index plus a
//! single summary embedding in the metadata store:
//!
//! ```text
//! DocumentOutput → combine text+tables → chunk_text → embed (batched)
//!     → VectorIndex::upsert → mean → SummaryEmbedding → mark indexed
//! ```
//!
//! Indexing is keyed by content hash, so identical bytes uploaded by two
//! profiles are embedded once. Entry ids are deterministic, which makes a
//! re-run after a partial failure overwrite rather than duplicate.

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_text, combine_text_and_tables};
use crate::embedding::{embed_texts, mean_normalized, EmbeddingProvider};
use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::models::{
    entry_id, DocType, DocumentOutput, EmbeddingMetadata, ExtractedDocument, IndexEntry, Profile,
    SummaryEmbedding,
};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::MetadataStore;

/// Converts a source file into text and tables.
///
/// Conversion failures are fatal for that content hash; the indexer does
/// not retry them.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, path: &Path) -> anyhow::Result<ExtractedDocument>;
}

/// Chunking and batching parameters.
#[derive(Debug, Clone, Copy)]
pub struct IndexerSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 80,
            batch_size: 64,
        }
    }
}

/// Counts from a pending-queue run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Documents chunked and embedded in this run.
    pub indexed: usize,
    /// Documents whose summary already existed.
    pub cached: usize,
    pub failed: usize,
}

/// Orchestrates chunking, embedding, index upserts, and summary bookkeeping.
pub struct DocumentIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn MetadataStore>,
    tenders: Arc<dyn VectorIndex>,
    profiles: Arc<dyn VectorIndex>,
    settings: IndexerSettings,
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

impl DocumentIndexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn MetadataStore>,
        tenders: Arc<dyn VectorIndex>,
        profiles: Arc<dyn VectorIndex>,
        settings: IndexerSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            tenders,
            profiles,
            settings,
        }
    }

    pub fn settings(&self) -> &IndexerSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    fn index_for(&self, doc_type: DocType) -> &Arc<dyn VectorIndex> {
        match doc_type {
            DocType::Tender => &self.tenders,
            DocType::Profile => &self.profiles,
        }
    }

    /// Index one document output and return its summary embedding.
    ///
    /// If a non-empty summary already exists for the content hash it is
    /// returned without touching the embedder. On failure the output is
    /// left unindexed with the error string and a timestamp recorded, and
    /// the error is returned. Entries upserted before the failure stay in
    /// the index.
    pub async fn index_document(
        &self,
        output: &DocumentOutput,
        progress: &dyn ProgressReporter,
    ) -> Result<SummaryEmbedding, IndexError> {
        self.index_document_tracked(output, progress)
            .await
            .map(|(summary, _cached)| summary)
    }

    async fn index_document_tracked(
        &self,
        output: &DocumentOutput,
        progress: &dyn ProgressReporter,
    ) -> Result<(SummaryEmbedding, bool), IndexError> {
        let doc_type = output.doc_type;
        let hash = output.content_hash.as_str();

        if let Some(summary) = self.store.get_summary(doc_type, hash).await? {
            if !summary.summary.is_empty() {
                debug!(content_hash = %hash, %doc_type, "Reusing existing summary embedding");
                if !output.indexed {
                    self.store
                        .mark_indexed(
                            doc_type,
                            hash,
                            summary.chunk_count,
                            &summary.model_name,
                            summary.indexed_at,
                        )
                        .await?;
                }
                return Ok((summary, true));
            }
        }

        match self.embed_and_store(output, progress).await {
            Ok(summary) => {
                if doc_type == DocType::Profile {
                    self.refresh_profiles_for_hash(hash).await?;
                }
                Ok((summary, false))
            }
            Err(e) => {
                warn!(content_hash = %hash, %doc_type, error = %e, "Indexing failed");
                if let Err(record_err) = self
                    .store
                    .mark_index_failed(doc_type, hash, &e.to_string(), now_ts())
                    .await
                {
                    warn!(content_hash = %hash, error = %record_err, "Could not record index failure");
                }
                Err(e)
            }
        }
    }

    async fn embed_and_store(
        &self,
        output: &DocumentOutput,
        progress: &dyn ProgressReporter,
    ) -> Result<SummaryEmbedding, IndexError> {
        let doc_type = output.doc_type;
        let hash = output.content_hash.as_str();
        let IndexerSettings {
            chunk_size,
            chunk_overlap,
            batch_size,
        } = self.settings;

        let text = combine_text_and_tables(&output.text, &output.tables);
        if text.is_empty() {
            return Err(IndexError::EmptyContent {
                content_hash: hash.to_string(),
            });
        }

        let chunks = chunk_text(&text, chunk_size, chunk_overlap);
        if chunks.is_empty() {
            return Err(IndexError::NoChunks {
                content_hash: hash.to_string(),
                chunk_size,
            });
        }

        let source = match output.tender_id.as_deref() {
            Some(tender_id) => self
                .store
                .get_tender(tender_id)
                .await?
                .and_then(|t| t.source),
            None => None,
        };

        let index = self.index_for(doc_type);
        let model_name = self.embedder.model_name().to_string();
        let total = chunks.len();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);

        for (batch_no, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
            let offset = batch_no * batch_size.max(1);
            let embeddings = embed_texts(self.embedder.as_ref(), batch)
                .await
                .map_err(IndexError::Embedding)?;
            if embeddings.len() != batch.len() {
                return Err(IndexError::EmbeddingCountMismatch {
                    expected: batch.len(),
                    actual: embeddings.len(),
                });
            }
            let dims = self.embedder.dims();
            if let Some(bad) = embeddings.iter().find(|v| v.len() != dims) {
                return Err(IndexError::DimensionMismatch {
                    model: model_name.clone(),
                    expected: dims,
                    actual: bad.len(),
                });
            }

            let entries: Vec<IndexEntry> = batch
                .iter()
                .zip(embeddings.iter())
                .enumerate()
                .map(|(i, (chunk, embedding))| IndexEntry {
                    id: entry_id(doc_type, hash, offset + i),
                    document: chunk.clone(),
                    embedding: embedding.clone(),
                    metadata: EmbeddingMetadata {
                        doc_type,
                        content_hash: hash.to_string(),
                        tender_id: output.tender_id.clone(),
                        chunk_index: offset + i,
                        model_name: model_name.clone(),
                        chunk_size,
                        chunk_overlap,
                        source: source.clone(),
                    },
                })
                .collect();
            index.upsert(&entries).await?;
            vectors.extend(embeddings);

            progress.report(ProgressEvent::Chunks {
                content_hash: hash.to_string(),
                done: vectors.len(),
                total,
            });
        }

        let summary = mean_normalized(&vectors).ok_or_else(|| {
            IndexError::Embedding(anyhow!(
                "embedding model '{}' returned vectors of inconsistent dimension",
                model_name
            ))
        })?;

        let indexed_at = now_ts();
        let summary = SummaryEmbedding {
            content_hash: hash.to_string(),
            doc_type,
            summary,
            chunk_count: total,
            model_name: model_name.clone(),
            indexed_at,
        };
        self.store.upsert_summary(&summary).await?;
        self.store
            .mark_indexed(doc_type, hash, total, &model_name, indexed_at)
            .await?;

        info!(content_hash = %hash, %doc_type, chunks = total, "Indexed document");
        Ok(summary)
    }

    /// Return the stored output for a content hash, converting `path` if
    /// there is none yet.
    ///
    /// Either way the given profile or tender reference is merged into the
    /// stored output. Text of an existing output is never replaced. Bytes
    /// already linked to one tender cannot be attached to another: chunks
    /// carry a single tender id, so the second tender would never resolve.
    pub async fn ensure_output(
        &self,
        doc_type: DocType,
        content_hash: &str,
        path: Option<&Path>,
        converter: &dyn DocumentConverter,
        profile_id: Option<&str>,
        tender_id: Option<&str>,
    ) -> Result<DocumentOutput, IndexError> {
        let mut output = match self.store.get_output(doc_type, content_hash).await? {
            Some(existing) => existing,
            None => {
                let path = path.ok_or_else(|| IndexError::MissingOutput {
                    content_hash: content_hash.to_string(),
                })?;
                let extracted =
                    converter
                        .convert(path)
                        .await
                        .map_err(|e| IndexError::Conversion {
                            content_hash: content_hash.to_string(),
                            message: format!("{:#}", e),
                        })?;
                debug!(content_hash, path = %path.display(), "Converted document");
                DocumentOutput::new(content_hash, doc_type, extracted)
            }
        };

        if let Some(pid) = profile_id {
            if !output.profile_ids.iter().any(|p| p == pid) {
                output.profile_ids.push(pid.to_string());
            }
        }
        match (output.tender_id.as_deref(), tender_id) {
            (Some(existing), Some(requested)) if existing != requested => {
                return Err(IndexError::TenderConflict {
                    content_hash: content_hash.to_string(),
                    existing: existing.to_string(),
                    requested: requested.to_string(),
                });
            }
            (None, Some(requested)) => output.tender_id = Some(requested.to_string()),
            _ => {}
        }

        self.store.upsert_output(&output).await?;
        Ok(self
            .store
            .get_output(doc_type, content_hash)
            .await?
            .unwrap_or(output))
    }

    /// Name and entry count of the collection holding a document type.
    pub async fn collection_stats(
        &self,
        doc_type: DocType,
    ) -> Result<(String, usize), IndexError> {
        let index = self.index_for(doc_type);
        Ok((index.name().to_string(), index.count().await?))
    }

    /// Index every unindexed output of a type.
    ///
    /// Failures are recorded on their outputs and counted; the run carries
    /// on with the next document.
    pub async fn index_pending(
        &self,
        doc_type: DocType,
        limit: Option<usize>,
        progress: &dyn ProgressReporter,
    ) -> Result<IndexReport, IndexError> {
        let pending = self.store.pending_outputs(doc_type, limit).await?;
        let total = pending.len();
        let mut report = IndexReport::default();

        for (n, output) in pending.iter().enumerate() {
            match self.index_document_tracked(output, progress).await {
                Ok((_, true)) => report.cached += 1,
                Ok((_, false)) => report.indexed += 1,
                Err(_) => report.failed += 1,
            }
            progress.report(ProgressEvent::Documents { n: n + 1, total });
        }

        info!(
            %doc_type,
            indexed = report.indexed,
            cached = report.cached,
            failed = report.failed,
            "Pending indexing finished"
        );
        Ok(report)
    }

    /// Clear a collection and re-index every output of its type.
    pub async fn rebuild(
        &self,
        doc_type: DocType,
        progress: &dyn ProgressReporter,
    ) -> Result<IndexReport, IndexError> {
        self.index_for(doc_type).clear().await?;
        let reset = self.store.reset_indexed(doc_type).await?;
        let dropped = self.store.delete_summaries(doc_type).await?;
        info!(%doc_type, reset, dropped, "Cleared collection for rebuild");
        self.index_pending(doc_type, None, progress).await
    }

    /// Re-normalized mean of the summaries of a profile's content hashes.
    ///
    /// Hashes without a non-empty summary are skipped. Returns `None` if no
    /// hash contributes.
    pub async fn aggregate_profile(
        &self,
        profile: &Profile,
    ) -> Result<Option<Vec<f32>>, IndexError> {
        let mut summaries = Vec::with_capacity(profile.content_hashes.len());
        for hash in &profile.content_hashes {
            if let Some(s) = self.store.get_summary(DocType::Profile, hash).await? {
                if !s.summary.is_empty() {
                    summaries.push(s.summary);
                }
            }
        }
        Ok(mean_normalized(&summaries))
    }

    /// Recompute the embedding of every profile that references a hash.
    ///
    /// Always aggregates over all of the profile's hashes, so the result
    /// does not depend on the order documents were indexed in. Returns the
    /// number of profiles updated.
    pub async fn refresh_profiles_for_hash(&self, content_hash: &str) -> Result<usize, IndexError> {
        let mut updated = 0;
        for mut profile in self.store.profiles_with_hash(content_hash).await? {
            if let Some(embedding) = self.aggregate_profile(&profile).await? {
                profile.embedding = Some(embedding);
                profile.updated_at = now_ts();
                self.store.upsert_profile(&profile).await?;
                updated += 1;
            }
        }
        if updated > 0 {
            debug!(content_hash, profiles = updated, "Refreshed profile embeddings");
        }
        Ok(updated)
    }
}
