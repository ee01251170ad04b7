//! End-to-end tests of indexing, profile jobs, and search over the
//! in-memory backends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use tender_match_core::embedding::{embed_texts, EmbeddingProvider};
use tender_match_core::error::{IndexError, SearchError};
use tender_match_core::index::memory::InMemoryIndex;
use tender_match_core::index::{IndexHit, VectorIndex};
use tender_match_core::indexer::{DocumentConverter, DocumentIndexer, IndexerSettings};
use tender_match_core::jobs::{mark_profile_failed, run_profile_job, ProfileDocument};
use tender_match_core::models::{
    entry_id, DocType, DocumentOutput, EmbeddingMetadata, ExtractedDocument, IndexEntry, Profile,
    ProfileStatus, Tender,
};
use tender_match_core::progress::{NoProgress, ProgressEvent, ProgressReporter};
use tender_match_core::search::{
    rerank_score, MatchResult, SearchEngine, SearchFilters, SearchParams, SearchRequest,
};
use tender_match_core::store::memory::InMemoryStore;
use tender_match_core::store::MetadataStore;

const DIMS: usize = 32;

/// Bag-of-words embedder: each token bumps one SHA-256-chosen dimension.
struct HashEmbedder {
    texts_embedded: AtomicUsize,
}

impl HashEmbedder {
    fn new() -> Self {
        Self {
            texts_embedded: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for token in t
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|s| !s.is_empty())
                {
                    let digest = Sha256::digest(token.to_lowercase().as_bytes());
                    v[digest[0] as usize % DIMS] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Always fails, for degrade-path tests.
struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("model unavailable"))
    }
}

/// Returns one vector fewer than asked for.
struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    fn model_name(&self) -> &str {
        "short"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Returns the same vector for every text.
struct FixedEmbedder {
    vector: Vec<f32>,
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

fn unit_x_embedder() -> Arc<FixedEmbedder> {
    Arc::new(FixedEmbedder {
        vector: vec![1.0, 0.0],
        dims: 2,
    })
}

/// In-memory index that records the `n_results` of every query.
struct RecordingIndex {
    inner: InMemoryIndex,
    requested: Mutex<Vec<usize>>,
}

impl RecordingIndex {
    fn new(name: &str) -> Self {
        Self {
            inner: InMemoryIndex::new(name),
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    fn name(&self) -> &str {
        self.inner.name()
    }
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        self.inner.upsert(entries).await
    }
    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<IndexHit>> {
        self.requested.lock().unwrap().push(n_results);
        self.inner.query(embedding, n_results).await
    }
    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

/// Converter backed by a path → text map.
struct MapConverter {
    docs: HashMap<PathBuf, String>,
    calls: AtomicUsize,
}

impl MapConverter {
    fn new(docs: &[(&str, &str)]) -> Self {
        Self {
            docs: docs
                .iter()
                .map(|(p, t)| (PathBuf::from(p), t.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentConverter for MapConverter {
    async fn convert(&self, path: &Path) -> Result<ExtractedDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self
            .docs
            .get(path)
            .ok_or_else(|| anyhow!("unreadable: {}", path.display()))?;
        Ok(ExtractedDocument {
            text: text.clone(),
            tables: vec![],
        })
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressReporter for Recorder {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Recorder {
    fn job_percents(&self) -> Vec<u8> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Job { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }
}

struct Harness {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<InMemoryStore>,
    tenders: Arc<InMemoryIndex>,
    profiles: Arc<InMemoryIndex>,
}

impl Harness {
    fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            store: Arc::new(InMemoryStore::new()),
            tenders: Arc::new(InMemoryIndex::new("tenders")),
            profiles: Arc::new(InMemoryIndex::new("profiles")),
        }
    }

    fn indexer(&self, settings: IndexerSettings) -> DocumentIndexer {
        DocumentIndexer::new(
            self.embedder.clone(),
            self.store.clone(),
            self.tenders.clone(),
            self.profiles.clone(),
            settings,
        )
    }

    fn engine(&self) -> SearchEngine {
        SearchEngine::new(
            self.embedder.clone(),
            self.store.clone(),
            self.tenders.clone(),
            self.profiles.clone(),
            SearchParams::default(),
        )
    }

    async fn add_tender(&self, id: &str, hash: &str, text: &str) -> DocumentOutput {
        self.store
            .upsert_tender(&Tender {
                id: id.to_string(),
                title: Some(format!("Tender {}", id)),
                pdf_url: Some(format!("https://example.gov/{}.pdf", id)),
                location: Some("New Delhi".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let mut output = DocumentOutput::new(
            hash,
            DocType::Tender,
            ExtractedDocument {
                text: text.to_string(),
                tables: vec![],
            },
        );
        output.tender_id = Some(id.to_string());
        self.store.upsert_output(&output).await.unwrap();
        output
    }
}

fn hash_embedder() -> Arc<HashEmbedder> {
    Arc::new(HashEmbedder::new())
}

#[tokio::test]
async fn test_index_document_is_idempotent() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings {
        chunk_size: 60,
        chunk_overlap: 10,
        batch_size: 2,
    });
    let text = "Supply of solar pumps.\nInstallation at ten sites.\n\
                Annual maintenance contract.\nTraining of operators.\nWarranty of five years.";
    let output = h.add_tender("t1", "hash-t1", text).await;

    let first = indexer.index_document(&output, &NoProgress).await.unwrap();
    let count = h.tenders.count().await.unwrap();
    assert!(count >= 2, "expected several chunks, got {}", count);
    assert_eq!(first.chunk_count, count);

    let stored = h.store.get_output(DocType::Tender, "hash-t1").await.unwrap().unwrap();
    assert!(stored.indexed);
    assert_eq!(stored.chunk_count, count);
    assert_eq!(stored.index_model.as_deref(), Some("hash-test"));

    // Dropping the summary forces a full re-run over the same ids.
    h.store.delete_summaries(DocType::Tender).await.unwrap();
    let second = indexer.index_document(&stored, &NoProgress).await.unwrap();
    assert_eq!(h.tenders.count().await.unwrap(), count);
    assert_eq!(first.summary, second.summary);

    let hits = h.tenders.query(&first.summary, count).await.unwrap();
    assert!(hits
        .iter()
        .any(|hit| hit.id == entry_id(DocType::Tender, "hash-t1", 0)));

    assert_eq!(
        indexer.collection_stats(DocType::Tender).await.unwrap(),
        ("tenders".to_string(), count)
    );
    assert_eq!(
        indexer.collection_stats(DocType::Profile).await.unwrap(),
        ("profiles".to_string(), 0)
    );
}

#[tokio::test]
async fn test_summary_is_unit_norm() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings::default());
    let output = h.add_tender("t1", "h1", "Bridge repair works in Assam").await;
    let summary = indexer.index_document(&output, &NoProgress).await.unwrap();
    let norm: f32 = summary.summary.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
    assert_eq!(summary.summary.len(), DIMS);
}

#[tokio::test]
async fn test_embedding_is_deterministic() {
    let embedder = HashEmbedder::new();
    let texts = vec!["Civil works".to_string(), "".to_string(), "civil WORKS".to_string()];
    let a = embed_texts(&embedder, &texts).await.unwrap();
    let b = embed_texts(&embedder, &texts).await.unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(a, b);
    assert_eq!(a[0], a[1]);
}

#[tokio::test]
async fn test_empty_content_is_recorded() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings::default());
    let output = h.add_tender("t1", "blank", "  \n ").await;

    let err = indexer.index_document(&output, &NoProgress).await.unwrap_err();
    assert!(matches!(err, IndexError::EmptyContent { .. }));

    let stored = h.store.get_output(DocType::Tender, "blank").await.unwrap().unwrap();
    assert!(!stored.indexed);
    assert!(stored.index_error.unwrap().contains("no extractable text"));
    assert!(stored.failed_at.is_some());
}

#[tokio::test]
async fn test_embedding_count_mismatch() {
    let h = Harness::new(Arc::new(ShortEmbedder));
    let indexer = h.indexer(IndexerSettings::default());
    let output = h.add_tender("t1", "h", "Some tender text").await;

    let err = indexer.index_document(&output, &NoProgress).await.unwrap_err();
    assert!(matches!(
        err,
        IndexError::EmbeddingCountMismatch {
            expected: 1,
            actual: 0
        }
    ));
    assert_eq!(h.tenders.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_wrong_dimension_vectors_are_rejected() {
    let h = Harness::new(Arc::new(FixedEmbedder {
        vector: vec![1.0, 0.0],
        dims: 3,
    }));
    let indexer = h.indexer(IndexerSettings::default());
    let output = h.add_tender("t1", "h", "Some tender text").await;

    let err = indexer.index_document(&output, &NoProgress).await.unwrap_err();
    assert!(matches!(
        err,
        IndexError::DimensionMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));
    assert_eq!(h.tenders.count().await.unwrap(), 0);
    let stored = h.store.get_output(DocType::Tender, "h").await.unwrap().unwrap();
    assert!(!stored.indexed);
    assert!(stored.index_error.is_some());
}

#[tokio::test]
async fn test_same_bytes_cannot_be_attached_to_two_tenders() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings::default());
    let converter = MapConverter::new(&[("/t/notice.pdf", "Construction of a footbridge.")]);
    let path = Path::new("/t/notice.pdf");

    let first = indexer
        .ensure_output(DocType::Tender, "shared", Some(path), &converter, None, Some("T1"))
        .await
        .unwrap();
    indexer.index_document(&first, &NoProgress).await.unwrap();

    let err = indexer
        .ensure_output(DocType::Tender, "shared", Some(path), &converter, None, Some("T2"))
        .await
        .unwrap_err();
    match err {
        IndexError::TenderConflict {
            existing,
            requested,
            ..
        } => {
            assert_eq!(existing, "T1");
            assert_eq!(requested, "T2");
        }
        other => panic!("unexpected: {:?}", other),
    }

    // Re-attaching to the same tender is fine.
    let again = indexer
        .ensure_output(DocType::Tender, "shared", Some(path), &converter, None, Some("T1"))
        .await
        .unwrap();
    assert_eq!(again.tender_id.as_deref(), Some("T1"));
    assert!(again.indexed);
    assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_index_pending_counts_failures_and_continues() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings::default());
    h.add_tender("t1", "a-good", "Road resurfacing in Pune").await;
    h.add_tender("t2", "b-empty", "").await;
    h.add_tender("t3", "c-good", "Hospital equipment supply").await;

    let recorder = Recorder::default();
    let report = indexer
        .index_pending(DocType::Tender, None, &recorder)
        .await
        .unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.cached, 0);

    let docs_done = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Documents { .. }))
        .count();
    assert_eq!(docs_done, 3);

    let pending = h.store.pending_outputs(DocType::Tender, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].content_hash, "b-empty");
}

#[tokio::test]
async fn test_rebuild_recomputes_everything() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings::default());
    h.add_tender("t1", "h1", "Water supply pipeline").await;
    h.add_tender("t2", "h2", "School building construction").await;
    indexer
        .index_pending(DocType::Tender, None, &NoProgress)
        .await
        .unwrap();
    assert_eq!(h.tenders.count().await.unwrap(), 2);

    let report = indexer.rebuild(DocType::Tender, &NoProgress).await.unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(report.cached, 0);
    assert_eq!(h.tenders.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_duplicate_content_across_profiles_is_embedded_once() {
    let embedder = hash_embedder();
    let h = Harness::new(embedder.clone());
    let indexer = h.indexer(IndexerSettings::default());
    let converter = MapConverter::new(&[("/up/a.pdf", "We build rural roads and culverts.")]);

    for id in ["p1", "p2"] {
        h.store
            .upsert_profile(&Profile::new(id, id, 0))
            .await
            .unwrap();
    }

    let doc = ProfileDocument {
        content_hash: "same-bytes".into(),
        path: Some(PathBuf::from("/up/a.pdf")),
    };
    let p1 = run_profile_job(&indexer, &converter, "p1", &[doc.clone()], &NoProgress)
        .await
        .unwrap();
    let after_first = embedder.texts_embedded.load(Ordering::SeqCst);

    let p2 = run_profile_job(&indexer, &converter, "p2", &[doc], &NoProgress)
        .await
        .unwrap();
    assert_eq!(embedder.texts_embedded.load(Ordering::SeqCst), after_first);
    assert_eq!(converter.calls.load(Ordering::SeqCst), 1);

    assert_eq!(p1.status, ProfileStatus::Ready);
    assert_eq!(p2.status, ProfileStatus::Ready);
    assert_eq!(p1.embedding, p2.embedding);

    let output = h
        .store
        .get_output(DocType::Profile, "same-bytes")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output.profile_ids, vec!["p1".to_string(), "p2".to_string()]);
}

#[tokio::test]
async fn test_profile_job_progress_and_dedup() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings::default());
    let converter = MapConverter::new(&[
        ("/up/a.pdf", "ISO 9001 certified contractor."),
        ("/up/b.pdf", "Fleet of forty excavators."),
    ]);
    h.store
        .upsert_profile(&Profile::new("p1", "Acme", 0))
        .await
        .unwrap();

    let docs = vec![
        ProfileDocument {
            content_hash: "ha".into(),
            path: Some(PathBuf::from("/up/a.pdf")),
        },
        ProfileDocument {
            content_hash: "hb".into(),
            path: Some(PathBuf::from("/up/b.pdf")),
        },
    ];
    let recorder = Recorder::default();
    let profile = run_profile_job(&indexer, &converter, "p1", &docs, &recorder)
        .await
        .unwrap();

    assert_eq!(recorder.job_percents(), vec![5, 42, 80, 100]);
    assert_eq!(profile.content_hashes, vec!["ha".to_string(), "hb".to_string()]);

    // Re-running with the same documents does not duplicate hashes.
    let again = run_profile_job(&indexer, &converter, "p1", &docs, &NoProgress)
        .await
        .unwrap();
    assert_eq!(again.content_hashes.len(), 2);
    assert_eq!(again.embedding, profile.embedding);
}

#[tokio::test]
async fn test_profile_job_failures() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings::default());
    let converter = MapConverter::new(&[]);
    h.store
        .upsert_profile(&Profile::new("p1", "Acme", 0))
        .await
        .unwrap();

    let err = run_profile_job(&indexer, &converter, "p1", &[], &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::NoDocuments));
    let stored = h.store.get_profile("p1").await.unwrap().unwrap();
    assert_eq!(stored.status, ProfileStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("No documents"));

    let missing_hash = ProfileDocument {
        content_hash: " ".into(),
        path: None,
    };
    let err = run_profile_job(&indexer, &converter, "p1", &[missing_hash], &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::MissingContentHash));

    let unreadable = ProfileDocument {
        content_hash: "hx".into(),
        path: Some(PathBuf::from("/nope.pdf")),
    };
    let err = run_profile_job(&indexer, &converter, "p1", &[unreadable], &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::Conversion { .. }));
    let stored = h.store.get_profile("p1").await.unwrap().unwrap();
    assert_eq!(stored.status, ProfileStatus::Failed);
    assert!(stored.error.unwrap().contains("unreadable"));

    let err = run_profile_job(&indexer, &converter, "ghost", &[], &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::ProfileNotFound(_)));
}

#[tokio::test]
async fn test_mark_profile_failed_before_job_starts() {
    let h = Harness::new(hash_embedder());
    h.store
        .upsert_profile(&Profile::new("p1", "Acme", 0))
        .await
        .unwrap();

    let profile = mark_profile_failed(h.store.as_ref(), "p1", "Failed to read /up/gone.pdf")
        .await
        .unwrap();
    assert_eq!(profile.status, ProfileStatus::Failed);

    let stored = h.store.get_profile("p1").await.unwrap().unwrap();
    assert_eq!(stored.status, ProfileStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("Failed to read /up/gone.pdf"));

    assert!(matches!(
        mark_profile_failed(h.store.as_ref(), "ghost", "x").await,
        Err(IndexError::ProfileNotFound(_))
    ));
}

/// Unit vector at the given cosine to `[1, 0]`.
fn at_cosine(cos: f32) -> Vec<f32> {
    vec![cos, (1.0 - cos * cos).sqrt()]
}

async fn seed_two_candidates(h: &Harness, expired_near: bool) {
    let now = chrono::Utc::now().timestamp();
    for (id, cos) in [("near", 0.9f32), ("far", 0.6f32)] {
        h.store
            .upsert_tender(&Tender {
                id: id.to_string(),
                title: Some(id.to_uppercase()),
                expires_at: if expired_near && id == "near" {
                    Some(now - 60)
                } else {
                    Some(now + 86_400)
                },
                ..Default::default()
            })
            .await
            .unwrap();
        h.tenders
            .upsert(&[IndexEntry {
                id: entry_id(DocType::Tender, id, 0),
                document: format!("{} tender chunk", id),
                embedding: at_cosine(cos),
                metadata: EmbeddingMetadata {
                    doc_type: DocType::Tender,
                    content_hash: id.to_string(),
                    tender_id: Some(id.to_string()),
                    chunk_index: 0,
                    model_name: "fixed".into(),
                    chunk_size: 500,
                    chunk_overlap: 80,
                    source: None,
                },
            }])
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_top_one_returns_closest_candidate() {
    let h = Harness::new(hash_embedder());
    seed_two_candidates(&h, false).await;

    let profile = [1.0f32, 0.0];
    let results = h
        .engine()
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 1,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tender_id, "near");
    assert_eq!(results[0].vector_score, 0.9);
    assert_eq!(results[0].rerank_score, 0.9);
    assert_eq!(results[0].because.profile_snippet, "");
}

#[tokio::test]
async fn test_expired_tenders_never_returned() {
    let h = Harness::new(hash_embedder());
    seed_two_candidates(&h, true).await;

    let profile = [1.0f32, 0.0];
    let results = h
        .engine()
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 2,
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<_> = results.iter().map(|r| r.tender_id.as_str()).collect();
    assert_eq!(ids, vec!["far"]);
}

#[tokio::test]
async fn test_unresolvable_candidates_are_dropped() {
    let h = Harness::new(hash_embedder());
    seed_two_candidates(&h, false).await;
    h.tenders
        .upsert(&[IndexEntry {
            id: "tender:orphan:0".into(),
            document: "orphan".into(),
            embedding: vec![1.0, 0.0],
            metadata: EmbeddingMetadata {
                doc_type: DocType::Tender,
                content_hash: "orphan".into(),
                tender_id: Some("deleted".into()),
                chunk_index: 0,
                model_name: "fixed".into(),
                chunk_size: 500,
                chunk_overlap: 80,
                source: None,
            },
        }])
        .await
        .unwrap();

    let profile = [1.0f32, 0.0];
    let results = h
        .engine()
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 3,
            ..Default::default()
        })
        .await
        .unwrap();
    let ids: Vec<_> = results.iter().map(|r| r.tender_id.as_str()).collect();
    assert_eq!(ids, vec!["near", "far"]);
}

#[tokio::test]
async fn test_empty_profile_yields_no_results() {
    let h = Harness::new(hash_embedder());
    seed_two_candidates(&h, false).await;
    h.store
        .upsert_profile(&Profile::new("p1", "Empty", 0))
        .await
        .unwrap();

    let engine = h.engine();
    let results = engine
        .search_profile("p1", 5, None, SearchFilters::default())
        .await
        .unwrap();
    assert!(results.is_empty());

    let empty: [f32; 0] = [];
    let results = engine
        .search(SearchRequest {
            profile_embedding: Some(&empty[..]),
            top_k: 5,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_failed_profile_surfaces_error() {
    let h = Harness::new(hash_embedder());
    let mut p = Profile::new("p1", "Broken", 0);
    p.status = ProfileStatus::Failed;
    p.error = Some("Missing file hash".into());
    h.store.upsert_profile(&p).await.unwrap();

    let engine = h.engine();
    match engine
        .search_profile("p1", 5, None, SearchFilters::default())
        .await
    {
        Err(SearchError::ProfileFailed { error, .. }) => assert_eq!(error, "Missing file hash"),
        other => panic!("unexpected: {:?}", other.map(|r| r.len())),
    }
    assert!(matches!(
        engine
            .search_profile("nobody", 5, None, SearchFilters::default())
            .await,
        Err(SearchError::ProfileNotFound(_))
    ));
}

#[tokio::test]
async fn test_query_embedding_failure_degrades_to_vector_search() {
    let h = Harness::new(Arc::new(FailingEmbedder));
    seed_two_candidates(&h, false).await;

    let profile = [1.0f32, 0.0];
    let hashes = vec!["someone".to_string()];
    let results = h
        .engine()
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 2,
            query: Some("near"),
            profile_content_hashes: &hashes,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r.rerank_score, r.vector_score);
        assert_eq!(r.because.profile_snippet, "");
    }
}

#[tokio::test]
async fn test_end_to_end_match_with_query_and_snippets() {
    let h = Harness::new(hash_embedder());
    let indexer = h.indexer(IndexerSettings::default());
    h.add_tender("t-solar", "hs", "Supply and installation of solar water pumps for irrigation")
        .await;
    h.add_tender("t-road", "hr", "Resurfacing of district roads with bituminous concrete")
        .await;
    indexer
        .index_pending(DocType::Tender, None, &NoProgress)
        .await
        .unwrap();

    let converter = MapConverter::new(&[(
        "/up/acme.pdf",
        "Acme installs solar water pumps for farmers across the state.",
    )]);
    h.store
        .upsert_profile(&Profile::new("acme", "Acme", 0))
        .await
        .unwrap();
    run_profile_job(
        &indexer,
        &converter,
        "acme",
        &[ProfileDocument {
            content_hash: "acme-1".into(),
            path: Some(PathBuf::from("/up/acme.pdf")),
        }],
        &NoProgress,
    )
    .await
    .unwrap();

    let filters = SearchFilters {
        location: Some("delhi".into()),
        ..Default::default()
    };
    let results = h
        .engine()
        .search_profile("acme", 2, Some("solar irrigation"), filters)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let top = &results[0];
    assert_eq!(top.tender_id, "t-solar");
    assert_eq!(top.pdf_url.as_deref(), Some("https://example.gov/t-solar.pdf"));
    assert_eq!(top.rerank_score, rerank_score(top.vector_score, 1.0, 0.7));
    assert!(top.because.tender_snippet.starts_with("Supply and installation"));
    assert!(top.because.profile_snippet.starts_with("Acme installs"));
    assert!(results[0].rerank_score >= results[1].rerank_score);

    let elsewhere = SearchFilters {
        location: Some("Chennai".into()),
        ..Default::default()
    };
    let none = h
        .engine()
        .search_profile("acme", 2, None, elsewhere)
        .await
        .unwrap();
    assert!(none.is_empty());
}

fn tender_chunk(id: &str, cos: f32, text: &str) -> IndexEntry {
    IndexEntry {
        id: entry_id(DocType::Tender, id, 0),
        document: text.to_string(),
        embedding: at_cosine(cos),
        metadata: EmbeddingMetadata {
            doc_type: DocType::Tender,
            content_hash: id.to_string(),
            tender_id: Some(id.to_string()),
            chunk_index: 0,
            model_name: "fixed".into(),
            chunk_size: 500,
            chunk_overlap: 80,
            source: None,
        },
    }
}

fn profile_chunk(hash: &str, cos: f32, text: &str) -> IndexEntry {
    IndexEntry {
        id: entry_id(DocType::Profile, hash, 0),
        document: text.to_string(),
        embedding: at_cosine(cos),
        metadata: EmbeddingMetadata {
            doc_type: DocType::Profile,
            content_hash: hash.to_string(),
            tender_id: None,
            chunk_index: 0,
            model_name: "fixed".into(),
            chunk_size: 500,
            chunk_overlap: 80,
            source: None,
        },
    }
}

/// Store a live tender record and one chunk for each `(id, cosine, text)`.
async fn seed_tenders(
    store: &InMemoryStore,
    index: &dyn VectorIndex,
    rows: &[(&str, f32, &str)],
) {
    for (id, cos, text) in rows {
        store
            .upsert_tender(&Tender {
                id: id.to_string(),
                title: Some(id.to_uppercase()),
                ..Default::default()
            })
            .await
            .unwrap();
        index.upsert(&[tender_chunk(id, *cos, text)]).await.unwrap();
    }
}

fn result_ids(results: &[MatchResult]) -> Vec<&str> {
    results.iter().map(|r| r.tender_id.as_str()).collect()
}

#[tokio::test]
async fn test_query_widens_retrieval_to_over_fetch() {
    let store = Arc::new(InMemoryStore::new());
    let tenders = Arc::new(RecordingIndex::new("tenders"));
    seed_tenders(
        &store,
        tenders.as_ref(),
        &[("a", 0.9, "road works"), ("b", 0.8, "bridge repair")],
    )
    .await;
    let engine = SearchEngine::new(
        unit_x_embedder(),
        store.clone(),
        tenders.clone(),
        Arc::new(InMemoryIndex::new("profiles")),
        SearchParams::default(),
    );

    let profile = [1.0f32, 0.0];
    for (top_k, query) in [(2, Some("bridge")), (60, Some("bridge")), (2, None), (2, Some("  "))] {
        engine
            .search(SearchRequest {
                profile_embedding: Some(&profile[..]),
                top_k,
                query,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    assert_eq!(*tenders.requested.lock().unwrap(), vec![50, 60, 2, 2]);
}

#[tokio::test]
async fn test_keyword_rerank_promotes_candidate_beyond_top_k() {
    let h = Harness::new(unit_x_embedder());
    seed_tenders(
        &h.store,
        h.tenders.as_ref(),
        &[
            ("a", 0.9, "Resurfacing of road works"),
            ("b", 0.8, "Road works in ward 4"),
            ("c", 0.7, "Bridge repair and painting"),
        ],
    )
    .await;

    let profile = [1.0f32, 0.0];
    let engine = h.engine();

    let plain = engine
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result_ids(&plain), vec!["a"]);

    let reranked = engine
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 1,
            query: Some("bridge"),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result_ids(&reranked), vec!["c"]);
    assert_eq!(reranked[0].vector_score, 0.7);
    assert_eq!(reranked[0].rerank_score, rerank_score(0.7, 1.0, 0.7));
    assert!(reranked[0].rerank_score > rerank_score(0.9, 0.0, 0.7));
}

#[tokio::test]
async fn test_equal_rerank_scores_keep_retrieval_order() {
    let h = Harness::new(unit_x_embedder());
    // Reranks with query "bridge": a 0.63, d 0.56, e 0.72, b 0.63, c 0.51.
    seed_tenders(
        &h.store,
        h.tenders.as_ref(),
        &[
            ("a", 0.9, "road works"),
            ("d", 0.8, "road works"),
            ("e", 0.6, "bridge works"),
            ("b", 0.4714, "bridge works"),
            ("c", 0.3, "bridge works"),
        ],
    )
    .await;

    let profile = [1.0f32, 0.0];
    let results = h
        .engine()
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 5,
            query: Some("bridge"),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result_ids(&results), vec!["e", "a", "b", "d", "c"]);
    assert_eq!(results[1].rerank_score, 0.63);
    assert_eq!(results[1].rerank_score, results[2].rerank_score);
    assert!(results[1].vector_score > results[2].vector_score);
}

#[tokio::test]
async fn test_snippet_pairing_skips_other_profiles_documents() {
    let h = Harness::new(unit_x_embedder());
    seed_tenders(&h.store, h.tenders.as_ref(), &[("t", 0.9, "Bridge repair")]).await;
    h.profiles
        .upsert(&[
            profile_chunk("theirs", 0.99, "Another firm paints bridges"),
            profile_chunk("mine", 0.5, "We repair steel bridges"),
        ])
        .await
        .unwrap();

    let profile = [1.0f32, 0.0];
    let engine = h.engine();
    let mine = vec!["mine".to_string()];
    let results = engine
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 1,
            profile_content_hashes: &mine,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].because.tender_snippet, "Bridge repair");
    assert_eq!(results[0].because.profile_snippet, "We repair steel bridges");

    let unrelated = vec!["nobody".to_string()];
    let results = engine
        .search(SearchRequest {
            profile_embedding: Some(&profile[..]),
            top_k: 1,
            profile_content_hashes: &unrelated,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(results[0].because.profile_snippet, "");
}
