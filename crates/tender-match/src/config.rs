//! Configuration parsing and validation.
//!
//! Tender Match is configured via a TOML file (default `config/tm.toml`).
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/tm.sqlite"
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 80
//!
//! [embedding]
//! provider = "local"
//! model = "bge-base-en-v1.5"
//! dims = 768
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tender_match_core::indexer::IndexerSettings;
use tender_match_core::search::SearchParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters carried over from the previous chunk.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Chunks embedded and upserted per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Texts per backend call (fastembed's internal batch size).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Identity of the backend this config builds; equal keys share one
    /// provider instance per process.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.provider,
            self.model.as_deref().unwrap_or(""),
            self.dims.unwrap_or(0),
            self.url.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_over_fetch")]
    pub over_fetch: usize,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_snippet_candidates")]
    pub snippet_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            over_fetch: default_over_fetch(),
            vector_weight: default_vector_weight(),
            snippet_chars: default_snippet_chars(),
            snippet_candidates: default_snippet_candidates(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_over_fetch() -> usize {
    50
}
fn default_vector_weight() -> f64 {
    0.7
}
fn default_snippet_chars() -> usize {
    350
}
fn default_snippet_candidates() -> usize {
    5
}

/// Vector index collection names.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    #[serde(default = "default_tender_collection")]
    pub tenders: String,
    #[serde(default = "default_profile_collection")]
    pub profiles: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            tenders: default_tender_collection(),
            profiles: default_profile_collection(),
        }
    }
}

fn default_tender_collection() -> String {
    "tender_embeddings".to_string()
}
fn default_profile_collection() -> String {
    "profile_embeddings".to_string()
}

impl Config {
    pub fn indexer_settings(&self) -> IndexerSettings {
        IndexerSettings {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
            batch_size: self.indexing.batch_size,
        }
    }

    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            over_fetch: self.retrieval.over_fetch,
            vector_weight: self.retrieval.vector_weight,
            snippet_chars: self.retrieval.snippet_chars,
            snippet_candidates: self.retrieval.snippet_candidates,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }

    if config.indexing.batch_size == 0 {
        bail!("indexing.batch_size must be > 0");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.vector_weight) {
        bail!("retrieval.vector_weight must be in [0.0, 1.0]");
    }

    if config.collections.tenders == config.collections.profiles {
        bail!("collections.tenders and collections.profiles must differ");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    // The local provider can infer both from its model table.
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(config)
}
