//! Progress rendering for `tm index`, `tm rebuild`, and `tm profile add`.
//!
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use tender_match_core::progress::{NoProgress, ProgressEvent, ProgressReporter};

/// Human-friendly progress on stderr: "index  documents  1,234 / 5,000".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Chunks {
                content_hash,
                done,
                total,
            } => format!(
                "embed {}  {} / {} chunks\n",
                short_hash(content_hash),
                format_number(*done as u64),
                format_number(*total as u64)
            ),
            ProgressEvent::Documents { n, total } => format!(
                "index  documents  {} / {}\n",
                format_number(*n as u64),
                format_number(*total as u64)
            ),
            ProgressEvent::Job {
                profile_id,
                percent,
            } => format!("profile {}  {}%\n", profile_id, percent),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Chunks {
                content_hash,
                done,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "content_hash": content_hash,
                "n": done,
                "total": total
            }),
            ProgressEvent::Documents { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "indexing",
                "n": n,
                "total": total
            }),
            ProgressEvent::Job {
                profile_id,
                percent,
            } => serde_json::json!({
                "event": "progress",
                "phase": "profile",
                "profile_id": profile_id,
                "percent": percent
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("--progress must be off, human, or json (got '{}')", other),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
