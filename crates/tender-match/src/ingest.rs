//! Ingest flows behind `tm profile`, `tm tender attach`, `tm index`, and
//! `tm rebuild`.
//!
//! Uploaded files are identified by the SHA-256 of their bytes, so the same
//! PDF attached to two profiles is converted and embedded once.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use tender_match_core::error::IndexError;
use tender_match_core::jobs::{mark_profile_failed, run_profile_job, ProfileDocument};
use tender_match_core::models::{DocType, Profile};
use tender_match_core::progress::ProgressReporter;

use crate::config::Config;
use crate::context::{AppContext, StoreContext};
use crate::extract::FileConverter;

/// SHA-256 of raw bytes, lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash a file on disk.
pub async fn hash_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content_hash(&bytes))
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

pub async fn run_profile_create(config: &Config, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Profile name must not be empty");
    }

    let ctx = StoreContext::open(config).await?;
    let profile = Profile::new(&Uuid::new_v4().to_string(), name, now_ts());
    ctx.store.upsert_profile(&profile).await?;
    info!(profile_id = %profile.id, "Created profile");

    println!("profile created");
    println!("  id: {}", profile.id);
    println!("  name: {}", profile.name);
    println!("  status: {}", profile.status.as_str());

    ctx.close().await;
    Ok(())
}

/// Upload documents to a profile and run its ingest job.
pub async fn run_profile_add(
    config: &Config,
    profile_id: &str,
    paths: &[PathBuf],
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let documents = match hash_documents(paths).await {
        Ok(documents) => documents,
        Err(e) => {
            let ctx = StoreContext::open(config).await?;
            let marked =
                mark_profile_failed(ctx.store.as_ref(), profile_id, &format!("{:#}", e)).await;
            ctx.close().await;
            if let Err(mark_err) = marked {
                warn!(profile_id, error = %mark_err, "Could not mark profile failed");
            }
            return Err(e);
        }
    };

    let ctx = AppContext::open(config).await?;
    let result = run_profile_job(
        &ctx.indexer,
        &FileConverter,
        profile_id,
        &documents,
        progress,
    )
    .await;

    let profile = match result {
        Ok(profile) => profile,
        Err(e) => {
            ctx.close().await;
            return Err(e).with_context(|| format!("Profile {} failed", profile_id));
        }
    };

    println!("profile {}", profile.id);
    println!("  status: {}", profile.status.as_str());
    println!("  documents: {}", profile.content_hashes.len());
    println!(
        "  embedding dims: {}",
        profile.embedding.as_ref().map(|e| e.len()).unwrap_or(0)
    );

    ctx.close().await;
    Ok(())
}

async fn hash_documents(paths: &[PathBuf]) -> Result<Vec<ProfileDocument>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        documents.push(ProfileDocument {
            content_hash: hash_file(path).await?,
            path: Some(path.clone()),
        });
    }
    Ok(documents)
}

pub async fn run_profile_show(config: &Config, profile_id: &str, json: bool) -> Result<()> {
    let ctx = StoreContext::open(config).await?;
    let profile = ctx.store.get_profile(profile_id).await?;
    ctx.close().await;

    let Some(profile) = profile else {
        bail!("Profile not found: {}", profile_id);
    };

    if json {
        let obj = serde_json::json!({
            "id": profile.id,
            "name": profile.name,
            "status": profile.status,
            "content_hashes": profile.content_hashes,
            "has_embedding": profile.usable_embedding().is_some(),
            "error": profile.error,
            "created_at": profile.created_at,
            "updated_at": profile.updated_at,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!("--- Profile ---");
    println!("id:         {}", profile.id);
    println!("name:       {}", profile.name);
    println!("status:     {}", profile.status.as_str());
    println!(
        "embedding:  {}",
        match profile.usable_embedding() {
            Some(e) => format!("{} dims", e.len()),
            None => "none".to_string(),
        }
    );
    if let Some(ref err) = profile.error {
        println!("error:      {}", err);
    }
    println!("updated_at: {}", format_ts(profile.updated_at));
    println!();
    println!("--- Documents ({}) ---", profile.content_hashes.len());
    for hash in &profile.content_hashes {
        println!("{}", hash);
    }

    Ok(())
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Convert a tender PDF, link it to its tender record, and index it.
pub async fn run_tender_attach(
    config: &Config,
    tender_id: &str,
    path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    if ctx.store.get_tender(tender_id).await?.is_none() {
        ctx.close().await;
        bail!(
            "Tender not found: {}. Import it first with `tm tender import`.",
            tender_id
        );
    }

    let hash = hash_file(path).await?;
    let result: Result<_, IndexError> = async {
        let output = ctx
            .indexer
            .ensure_output(
                DocType::Tender,
                &hash,
                Some(path),
                &FileConverter,
                None,
                Some(tender_id),
            )
            .await?;
        ctx.indexer.index_document(&output, progress).await
    }
    .await;

    ctx.close().await;
    let summary = result.with_context(|| format!("Failed to index {}", path.display()))?;

    println!("tender {}", tender_id);
    println!("  content hash: {}", hash);
    println!("  chunks: {}", summary.chunk_count);
    println!("  model: {}", summary.model_name);
    Ok(())
}

/// Index every unindexed output of one type.
pub async fn run_index(
    config: &Config,
    doc_type: DocType,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let result = async {
        let report = ctx.indexer.index_pending(doc_type, limit, progress).await?;
        let stats = ctx.indexer.collection_stats(doc_type).await?;
        Ok::<_, IndexError>((report, stats))
    }
    .await;
    ctx.close().await;
    let (report, (collection, entries)) = result?;

    println!("index {}", doc_type);
    println!("  indexed: {}", report.indexed);
    println!("  cached: {}", report.cached);
    println!("  failed: {}", report.failed);
    println!("  collection {}: {} entries", collection, entries);
    Ok(())
}

/// Clear one collection and re-index all of its outputs.
pub async fn run_rebuild(
    config: &Config,
    doc_type: DocType,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let result = async {
        let report = ctx.indexer.rebuild(doc_type, progress).await?;
        let stats = ctx.indexer.collection_stats(doc_type).await?;
        Ok::<_, IndexError>((report, stats))
    }
    .await;
    ctx.close().await;
    let (report, (collection, entries)) = result?;

    println!("rebuild {}", doc_type);
    println!("  indexed: {}", report.indexed);
    println!("  failed: {}", report.failed);
    println!("  collection {}: {} entries", collection, entries);
    Ok(())
}
