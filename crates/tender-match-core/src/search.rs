//! Hybrid tender search: vector retrieval, keyword re-ranking, and
//! "because" snippet pairing.
//!
//! The engine works entirely through the [`VectorIndex`], [`MetadataStore`]
//! and [`EmbeddingProvider`] traits, with no database or configuration
//! dependencies.
//!
//! # Scoring Algorithm
//!
//! 1. Combine the profile embedding with the embedded query (if any) into
//!    one re-normalized vector.
//! 2. Fetch `max(over_fetch, top_k)` tender chunks when a query is present,
//!    otherwise exactly `top_k`.
//! 3. Drop candidates whose tender is unknown, expired, or filtered out.
//! 4. `vector_score = round(max(0, 1 - distance), 4)`.
//! 5. With a query: `rerank = round(w × vector + (1 - w) × keyword, 4)`,
//!    where `keyword` is the fraction of distinct query tokens present in
//!    the tender snippet. Without a query: `rerank = vector`.
//! 6. Stable sort by `rerank` (desc), truncate to `top_k`.
//! 7. Pair each surviving tender snippet with the closest passage from the
//!    requesting profile's own documents.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::embedding::{embed_query, mean_normalized, EmbeddingProvider};
use crate::error::SearchError;
use crate::index::{IndexHit, VectorIndex};
use crate::models::{ProfileStatus, Tender};
use crate::store::MetadataStore;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Minimum retrieval width when a textual query is present.
    pub over_fetch: usize,
    /// Weight of the vector score in the rerank blend, in `[0, 1]`.
    pub vector_weight: f64,
    /// Characters kept from each side of the snippet pair.
    pub snippet_chars: usize,
    /// Profile chunks considered when pairing snippets.
    pub snippet_candidates: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            over_fetch: 50,
            vector_weight: 0.7,
            snippet_chars: 350,
            snippet_candidates: 5,
        }
    }
}

/// Structured tender filters. Blank values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub location: Option<String>,
    pub dept: Option<String>,
    pub deadline: Option<String>,
}

impl SearchFilters {
    fn active(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("location", self.location.as_deref()),
            ("dept", self.dept.as_deref()),
            ("deadline", self.deadline.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
    }

    /// Case-insensitive substring match on every active filter.
    ///
    /// A filter on a field the tender does not carry passes.
    pub fn matches(&self, tender: &Tender) -> bool {
        self.active().all(|(key, wanted)| match tender.field(key) {
            Some(actual) => actual.to_lowercase().contains(&wanted.to_lowercase()),
            None => true,
        })
    }
}

/// Inputs for one search.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest<'a> {
    pub profile_embedding: Option<&'a [f32]>,
    pub top_k: usize,
    pub query: Option<&'a str>,
    pub filters: SearchFilters,
    /// Content hashes whose profile chunks may supply the "because" snippet.
    pub profile_content_hashes: &'a [String],
}

/// The explanatory snippet pair for a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Because {
    pub tender_snippet: String,
    /// Empty when no passage from the requesting profile was found.
    pub profile_snippet: String,
}

/// One ranked tender match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub tender_id: String,
    pub vector_score: f64,
    pub rerank_score: f64,
    pub title: Option<String>,
    pub reference_no: Option<String>,
    pub pdf_url: Option<String>,
    pub duration: Option<String>,
    pub source: Option<String>,
    pub chunk_index: usize,
    pub because: Because,
}

/// Why a retrieved candidate did not make it into the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateDrop {
    Unresolved,
    Expired,
    Filtered,
}

struct Candidate {
    hit: IndexHit,
    tender: Tender,
    tender_snippet: String,
    vector_score: f64,
    rerank_score: f64,
}

/// Hybrid search over the tender collection.
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn MetadataStore>,
    tenders: Arc<dyn VectorIndex>,
    profiles: Arc<dyn VectorIndex>,
    params: SearchParams,
}

impl SearchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn MetadataStore>,
        tenders: Arc<dyn VectorIndex>,
        profiles: Arc<dyn VectorIndex>,
        params: SearchParams,
    ) -> Self {
        Self {
            embedder,
            store,
            tenders,
            profiles,
            params,
        }
    }

    /// Search tenders for a stored profile.
    ///
    /// A profile without an embedding yields no results. A `FAILED` profile
    /// surfaces its stored error.
    pub async fn search_profile(
        &self,
        profile_id: &str,
        top_k: usize,
        query: Option<&str>,
        filters: SearchFilters,
    ) -> Result<Vec<MatchResult>, SearchError> {
        let profile = self
            .store
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| SearchError::ProfileNotFound(profile_id.to_string()))?;

        if profile.status == ProfileStatus::Failed {
            return Err(SearchError::ProfileFailed {
                id: profile.id.clone(),
                error: profile
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let Some(embedding) = profile.usable_embedding() else {
            debug!(profile_id, "Profile has no embedding yet");
            return Ok(Vec::new());
        };

        self.search(SearchRequest {
            profile_embedding: Some(embedding),
            top_k,
            query,
            filters,
            profile_content_hashes: &profile.content_hashes,
        })
        .await
    }

    /// Rank tenders against a profile embedding and/or a free-text query.
    pub async fn search(&self, req: SearchRequest<'_>) -> Result<Vec<MatchResult>, SearchError> {
        if req.top_k == 0 {
            return Ok(Vec::new());
        }

        let query = req.query.map(str::trim).filter(|q| !q.is_empty());
        let query_vec = match query {
            Some(q) => match embed_query(self.embedder.as_ref(), q).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "Query embedding failed; falling back to vector-only search");
                    None
                }
            },
            None => None,
        };
        // Re-ranking only applies when the query actually contributed.
        let query = query.filter(|_| query_vec.is_some());

        let profile_vec = req.profile_embedding.filter(|v| !v.is_empty());
        let combined = match (profile_vec, query_vec) {
            (Some(p), Some(q)) => mean_normalized(&[p.to_vec(), q]),
            (Some(p), None) => Some(p.to_vec()),
            (None, Some(q)) => Some(q),
            (None, None) => None,
        };
        let Some(combined) = combined else {
            return Ok(Vec::new());
        };

        let retrieval_k = if query.is_some() {
            self.params.over_fetch.max(req.top_k)
        } else {
            req.top_k
        };
        let hits = self.tenders.query(&combined, retrieval_k).await?;
        debug!(retrieved = hits.len(), retrieval_k, "Tender candidates fetched");

        let query_tokens = query.map(tokenize);
        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let tender = match self.resolve(&hit, &req.filters).await {
                Ok(t) => t,
                Err(reason) => {
                    debug!(id = %hit.id, ?reason, "Dropping candidate");
                    continue;
                }
            };

            let tender_snippet = truncate_chars(&hit.document, self.params.snippet_chars);
            let vector_score = round4(hit.similarity());
            let rerank_score = match &query_tokens {
                Some(tokens) => rerank_score(
                    vector_score,
                    keyword_score(tokens, &tender_snippet),
                    self.params.vector_weight,
                ),
                None => vector_score,
            };
            candidates.push(Candidate {
                hit,
                tender,
                tender_snippet,
                vector_score,
                rerank_score,
            });
        }

        // `sort_by` is stable: equal scores keep retrieval order.
        candidates.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(req.top_k);

        let mut results = Vec::with_capacity(candidates.len());
        for c in candidates {
            let profile_snippet = self
                .pair_snippet(&c.tender_snippet, req.profile_content_hashes)
                .await
                .unwrap_or_default();
            results.push(MatchResult {
                tender_id: c.tender.id,
                vector_score: c.vector_score,
                rerank_score: c.rerank_score,
                title: c.tender.title,
                reference_no: c.tender.reference_no,
                pdf_url: c.tender.pdf_url,
                duration: c.tender.duration,
                source: c.tender.source,
                chunk_index: c.hit.metadata.chunk_index,
                because: Because {
                    tender_snippet: c.tender_snippet,
                    profile_snippet,
                },
            });
        }
        Ok(results)
    }

    async fn resolve(&self, hit: &IndexHit, filters: &SearchFilters) -> Result<Tender, CandidateDrop> {
        let tender_id = hit
            .metadata
            .tender_id
            .as_deref()
            .ok_or(CandidateDrop::Unresolved)?;
        let tender = match self.store.get_tender(tender_id).await {
            Ok(Some(t)) => t,
            Ok(None) => return Err(CandidateDrop::Unresolved),
            Err(e) => {
                warn!(tender_id, error = %e, "Tender lookup failed");
                return Err(CandidateDrop::Unresolved);
            }
        };
        if tender.is_expired(chrono::Utc::now().timestamp()) {
            return Err(CandidateDrop::Expired);
        }
        if !filters.matches(&tender) {
            return Err(CandidateDrop::Filtered);
        }
        Ok(tender)
    }

    /// Closest passage from the requesting profile's own documents.
    ///
    /// Returns `None` when the snippet cannot be embedded, the profile index
    /// query fails, or none of the top candidates belongs to the profile.
    pub async fn pair_snippet(
        &self,
        tender_snippet: &str,
        profile_content_hashes: &[String],
    ) -> Option<String> {
        if profile_content_hashes.is_empty() {
            return None;
        }
        let embedding = match embed_query(self.embedder.as_ref(), tender_snippet).await {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "Snippet embedding failed");
                return None;
            }
        };
        let hits = match self
            .profiles
            .query(&embedding, self.params.snippet_candidates)
            .await
        {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "Profile snippet query failed");
                return None;
            }
        };
        hits.into_iter()
            .find(|h| profile_content_hashes.contains(&h.metadata.content_hash))
            .map(|h| truncate_chars(&h.document, self.params.snippet_chars))
    }
}

/// Round to 4 decimal places.
pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Distinct lower-cased alphanumeric runs.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query tokens present in `text`, in `[0, 1]`.
pub fn keyword_score(query_tokens: &HashSet<String>, text: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens = tokenize(text);
    let hits = query_tokens
        .iter()
        .filter(|t| text_tokens.contains(*t))
        .count();
    (hits as f64 / query_tokens.len() as f64).clamp(0.0, 1.0)
}

/// Blend vector and keyword scores: `round(w·vector + (1-w)·keyword, 4)`.
pub fn rerank_score(vector_score: f64, keyword_score: f64, vector_weight: f64) -> f64 {
    round4(vector_weight * vector_score + (1.0 - vector_weight) * keyword_score)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
