//! Progress reporting port for indexing and ingest jobs.
//!
//! The core only emits [`ProgressEvent`]s; rendering them (stderr lines,
//! JSON, a job-status row) is the caller's business.

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Chunk batches embedded for one document: `done` of `total` chunks.
    Chunks {
        content_hash: String,
        done: usize,
        total: usize,
    },
    /// Pending-queue indexing: `n` documents processed out of `total`.
    Documents { n: usize, total: usize },
    /// Profile ingest job milestone, `percent` in `0..=100`.
    Job { profile_id: String, percent: u8 },
}

/// Receives progress events. Called synchronously from the pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Ingest job percentage after `done` of `total` documents.
///
/// Jobs start at 5, document processing spans the next 75 points, and the
/// remaining 20 are reserved for aggregation.
pub fn job_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 5;
    }
    let done = done.min(total);
    (5 + done * 75 / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_percent_milestones() {
        assert_eq!(job_percent(0, 4), 5);
        assert_eq!(job_percent(1, 4), 23);
        assert_eq!(job_percent(2, 4), 42);
        assert_eq!(job_percent(4, 4), 80);
        assert_eq!(job_percent(9, 4), 80);
        assert_eq!(job_percent(0, 0), 5);
    }
}
