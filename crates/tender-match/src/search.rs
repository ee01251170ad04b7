//! `tm search` and `tm match`: rank tenders for a profile or a single file.

use anyhow::{Context, Result};
use std::path::Path;

use tender_match_core::error::IndexError;
use tender_match_core::models::DocType;
use tender_match_core::progress::ProgressReporter;
use tender_match_core::search::{MatchResult, SearchFilters, SearchRequest};

use crate::config::Config;
use crate::context::AppContext;
use crate::extract::FileConverter;
use crate::ingest::hash_file;

/// Search options shared by `tm search` and `tm match`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub query: Option<String>,
    pub filters: SearchFilters,
    /// Overrides `retrieval.top_k`.
    pub top_k: Option<usize>,
    pub json: bool,
}

/// Search tenders for a stored profile.
pub async fn run_search(config: &Config, profile_id: &str, opts: &SearchOptions) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let top_k = opts.top_k.unwrap_or(config.retrieval.top_k);

    let result = ctx
        .engine
        .search_profile(
            profile_id,
            top_k,
            opts.query.as_deref(),
            opts.filters.clone(),
        )
        .await;
    ctx.close().await;

    print_results(&result?, opts.json)
}

/// Embed one file as an ad-hoc profile and search with it.
///
/// The file's output and summary are stored like any profile document, so
/// matching the same file again reuses them.
pub async fn run_match(
    config: &Config,
    path: &Path,
    opts: &SearchOptions,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let hash = hash_file(path).await?;
    let top_k = opts.top_k.unwrap_or(config.retrieval.top_k);

    let summary: Result<_, IndexError> = async {
        let output = ctx
            .indexer
            .ensure_output(
                DocType::Profile,
                &hash,
                Some(path),
                &FileConverter,
                None,
                None,
            )
            .await?;
        ctx.indexer.index_document(&output, progress).await
    }
    .await;
    let summary = match summary {
        Ok(summary) => summary,
        Err(e) => {
            ctx.close().await;
            return Err(e).with_context(|| format!("Failed to index {}", path.display()));
        }
    };

    let hashes = vec![hash];
    let result = ctx
        .engine
        .search(SearchRequest {
            profile_embedding: Some(&summary.summary),
            top_k,
            query: opts.query.as_deref(),
            filters: opts.filters.clone(),
            profile_content_hashes: &hashes,
        })
        .await;
    ctx.close().await;

    print_results(&result?, opts.json)
}

fn print_results(results: &[MatchResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let title_display = result.title.as_deref().unwrap_or("(untitled)");
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            result.rerank_score,
            result.tender_id,
            title_display
        );
        println!("    vector score: {:.4}", result.vector_score);
        if let Some(ref reference) = result.reference_no {
            println!("    ref: {}", reference);
        }
        if let Some(ref source) = result.source {
            println!("    source: {}", source);
        }
        if let Some(ref duration) = result.duration {
            println!("    duration: {}", duration);
        }
        if let Some(ref url) = result.pdf_url {
            println!("    pdf: {}", url);
        }
        println!(
            "    tender: \"{}\"",
            result.because.tender_snippet.replace('\n', " ").trim()
        );
        if !result.because.profile_snippet.is_empty() {
            println!(
                "    because: \"{}\"",
                result.because.profile_snippet.replace('\n', " ").trim()
            );
        }
        println!();
    }

    Ok(())
}
