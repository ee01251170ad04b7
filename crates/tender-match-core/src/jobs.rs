//! Profile ingest job.
//!
//! Drives a profile from `UPLOADING`/`PROCESSING` to `READY` or `FAILED`:
//! each uploaded document is converted (if new), indexed, and finally the
//! profile embedding is aggregated from all of its content hashes.
//!
//! Progress milestones: 5 at start, `5 + (i+1)/n·75` after each document,
//! 100 on success.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::IndexError;
use crate::indexer::{DocumentConverter, DocumentIndexer};
use crate::models::{DocType, Profile, ProfileStatus};
use crate::progress::{job_percent, ProgressEvent, ProgressReporter};
use crate::store::MetadataStore;

/// One uploaded profile document.
#[derive(Debug, Clone)]
pub struct ProfileDocument {
    /// SHA-256 of the uploaded bytes, lowercase hex.
    pub content_hash: String,
    /// Source file; only needed when no output exists for the hash yet.
    pub path: Option<PathBuf>,
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Run the ingest job for one profile.
///
/// Stops at the first failing document. On any failure the profile is
/// stored as `FAILED` with the error string and the error is returned.
pub async fn run_profile_job(
    indexer: &DocumentIndexer,
    converter: &dyn DocumentConverter,
    profile_id: &str,
    documents: &[ProfileDocument],
    progress: &dyn ProgressReporter,
) -> Result<Profile, IndexError> {
    let store = indexer.store();
    let mut profile = store
        .get_profile(profile_id)
        .await?
        .ok_or_else(|| IndexError::ProfileNotFound(profile_id.to_string()))?;

    profile.status = ProfileStatus::Processing;
    profile.error = None;
    profile.updated_at = now_ts();
    store.upsert_profile(&profile).await?;
    report(progress, profile_id, 5);

    match process_documents(indexer, converter, &mut profile, documents, progress).await {
        Ok(()) => {
            profile.status = ProfileStatus::Ready;
            profile.updated_at = now_ts();
            store.upsert_profile(&profile).await?;
            report(progress, profile_id, 100);
            info!(
                profile_id,
                documents = profile.content_hashes.len(),
                "Profile ready"
            );
            Ok(profile)
        }
        Err(e) => {
            warn!(profile_id, error = %e, "Profile job failed");
            store_failure(store.as_ref(), &mut profile, &e.to_string()).await?;
            Err(e)
        }
    }
}

/// Store a profile as `FAILED` with an error string.
///
/// For failures that happen before a job can start, such as an upload that
/// cannot be read.
pub async fn mark_profile_failed(
    store: &dyn MetadataStore,
    profile_id: &str,
    error: &str,
) -> Result<Profile, IndexError> {
    let mut profile = store
        .get_profile(profile_id)
        .await?
        .ok_or_else(|| IndexError::ProfileNotFound(profile_id.to_string()))?;
    store_failure(store, &mut profile, error).await?;
    Ok(profile)
}

async fn store_failure(
    store: &dyn MetadataStore,
    profile: &mut Profile,
    error: &str,
) -> Result<(), IndexError> {
    profile.status = ProfileStatus::Failed;
    profile.error = Some(error.to_string());
    profile.updated_at = now_ts();
    store.upsert_profile(profile).await?;
    Ok(())
}

async fn process_documents(
    indexer: &DocumentIndexer,
    converter: &dyn DocumentConverter,
    profile: &mut Profile,
    documents: &[ProfileDocument],
    progress: &dyn ProgressReporter,
) -> Result<(), IndexError> {
    if documents.is_empty() {
        return Err(IndexError::NoDocuments);
    }

    let total = documents.len();
    for (i, doc) in documents.iter().enumerate() {
        if doc.content_hash.trim().is_empty() {
            return Err(IndexError::MissingContentHash);
        }
        let output = indexer
            .ensure_output(
                DocType::Profile,
                &doc.content_hash,
                doc.path.as_deref(),
                converter,
                Some(profile.id.as_str()),
                None,
            )
            .await?;
        indexer.index_document(&output, progress).await?;
        report(progress, &profile.id, job_percent(i + 1, total));
    }

    for doc in documents {
        if !profile.content_hashes.contains(&doc.content_hash) {
            profile.content_hashes.push(doc.content_hash.clone());
        }
    }

    let embedding = indexer
        .aggregate_profile(profile)
        .await?
        .ok_or_else(|| IndexError::ProfileEmbedding {
            profile_id: profile.id.clone(),
        })?;
    profile.embedding = Some(embedding);
    Ok(())
}

fn report(progress: &dyn ProgressReporter, profile_id: &str, percent: u8) {
    progress.report(ProgressEvent::Job {
        profile_id: profile_id.to_string(),
        percent,
    });
}
