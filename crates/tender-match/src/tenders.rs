//! `tm tender import`: load tender records from a JSON array.
//!
//! Records are upserted by `id`, so re-importing a scraper dump refreshes
//! titles, deadlines, and expiry without touching indexed documents.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use tender_match_core::models::Tender;

use crate::config::Config;
use crate::context::StoreContext;

/// Parse and validate a JSON array of tender records.
pub fn parse_tenders(content: &str) -> Result<Vec<Tender>> {
    let tenders: Vec<Tender> =
        serde_json::from_str(content).context("Tender file must be a JSON array of objects")?;

    let mut seen = HashSet::new();
    for (i, tender) in tenders.iter().enumerate() {
        if tender.id.trim().is_empty() {
            bail!("Tender at position {} has an empty id", i);
        }
        if !seen.insert(tender.id.as_str()) {
            bail!("Duplicate tender id: {}", tender.id);
        }
    }

    Ok(tenders)
}

pub async fn run_tender_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tender file: {}", path.display()))?;
    let tenders = parse_tenders(&content)?;

    let ctx = StoreContext::open(config).await?;
    for tender in &tenders {
        ctx.store.upsert_tender(tender).await?;
    }
    ctx.close().await;

    info!(count = tenders.len(), path = %path.display(), "Imported tenders");
    println!("tender import");
    println!("  upserted: {}", tenders.len());
    Ok(())
}
