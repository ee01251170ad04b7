//! Core data models used throughout Tender Match.
//!
//! These types represent the extracted documents, index entries, summary
//! vectors, profiles, and tender records that flow through the indexing and
//! matching pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the match a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Tender,
    Profile,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Tender => "tender",
            DocType::Profile => "profile",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tender" | "tenders" => Ok(DocType::Tender),
            "profile" | "profiles" => Ok(DocType::Profile),
            other => anyhow::bail!("Unknown document type: '{}'. Use tender or profile.", other),
        }
    }
}

/// Converter output before it is stored: plain text plus free-form tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    #[serde(default)]
    pub tables: Vec<serde_json::Value>,
}

/// One extracted-text record per unique content hash.
///
/// Text and tables are immutable once written; only the indexing state
/// fields change over the record's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub content_hash: String,
    pub doc_type: DocType,
    pub text: String,
    #[serde(default)]
    pub tables: Vec<serde_json::Value>,
    /// Backing tender record for `DocType::Tender` outputs.
    #[serde(default)]
    pub tender_id: Option<String>,
    /// Profiles that uploaded this content.
    #[serde(default)]
    pub profile_ids: Vec<String>,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub index_model: Option<String>,
    #[serde(default)]
    pub indexed_at: Option<i64>,
    #[serde(default)]
    pub index_error: Option<String>,
    #[serde(default)]
    pub failed_at: Option<i64>,
}

impl DocumentOutput {
    pub fn new(content_hash: &str, doc_type: DocType, extracted: ExtractedDocument) -> Self {
        Self {
            content_hash: content_hash.to_string(),
            doc_type,
            text: extracted.text,
            tables: extracted.tables,
            tender_id: None,
            profile_ids: Vec::new(),
            indexed: false,
            chunk_count: 0,
            index_model: None,
            indexed_at: None,
            index_error: None,
            failed_at: None,
        }
    }
}

/// Metadata attached to every vector index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub doc_type: DocType,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tender_id: Option<String>,
    pub chunk_index: usize,
    pub model_name: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Deterministic vector index id for a chunk.
///
/// Re-indexing the same content always produces the same ids, so repeated
/// runs overwrite rather than duplicate.
pub fn entry_id(doc_type: DocType, content_hash: &str, chunk_index: usize) -> String {
    format!("{}:{}:{}", doc_type, content_hash, chunk_index)
}

/// A single vector index entry.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: EmbeddingMetadata,
}

/// Mean-of-chunks vector for one content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEmbedding {
    pub content_hash: String,
    pub doc_type: DocType,
    pub summary: Vec<f32>,
    pub chunk_count: usize,
    pub model_name: String,
    pub indexed_at: i64,
}

/// Profile lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProfileStatus {
    Uploading,
    Processing,
    Ready,
    Failed,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileStatus::Uploading => "UPLOADING",
            ProfileStatus::Processing => "PROCESSING",
            ProfileStatus::Ready => "READY",
            ProfileStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for ProfileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADING" => Ok(ProfileStatus::Uploading),
            "PROCESSING" => Ok(ProfileStatus::Processing),
            "READY" => Ok(ProfileStatus::Ready),
            "FAILED" => Ok(ProfileStatus::Failed),
            other => anyhow::bail!("Unknown profile status: {}", other),
        }
    }
}

/// A company profile built from one or more uploaded documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub status: ProfileStatus,
    #[serde(default)]
    pub content_hashes: Vec<String>,
    /// Re-normalized mean of the summary embeddings of `content_hashes`.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Profile {
    pub fn new(id: &str, name: &str, now: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: ProfileStatus::Uploading,
            content_hashes: Vec::new(),
            embedding: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The profile embedding, if one has been computed and is non-empty.
    pub fn usable_embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|v| !v.is_empty())
    }
}

/// A scraped tender, owned by the external tender store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "tender_ref_no")]
    pub reference_no: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub dept: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    /// Unix timestamp after which the tender must not be returned.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl Tender {
    /// Look up a filterable attribute by name.
    pub fn field(&self, key: &str) -> Option<&str> {
        match key {
            "location" => self.location.as_deref(),
            "dept" => self.dept.as_deref(),
            "deadline" => self.deadline.as_deref(),
            "title" => self.title.as_deref(),
            "source" => self.source.as_deref(),
            _ => None,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(ts) if ts <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_format() {
        assert_eq!(entry_id(DocType::Profile, "abc", 3), "profile:abc:3");
        assert_eq!(entry_id(DocType::Tender, "f00", 0), "tender:f00:0");
    }

    #[test]
    fn test_doc_type_parse() {
        assert_eq!("tenders".parse::<DocType>().unwrap(), DocType::Tender);
        assert_eq!("profile".parse::<DocType>().unwrap(), DocType::Profile);
        assert!("other".parse::<DocType>().is_err());
    }

    #[test]
    fn test_tender_expiry() {
        let mut t = Tender {
            id: "t1".into(),
            ..Default::default()
        };
        assert!(!t.is_expired(1_000));
        t.expires_at = Some(999);
        assert!(t.is_expired(1_000));
        t.expires_at = Some(1_001);
        assert!(!t.is_expired(1_000));
    }

    #[test]
    fn test_tender_deserialize_ref_alias() {
        let t: Tender =
            serde_json::from_str(r#"{"id":"x","tender_ref_no":"MHA/2024/7"}"#).unwrap();
        assert_eq!(t.reference_no.as_deref(), Some("MHA/2024/7"));
    }

    #[test]
    fn test_usable_embedding() {
        let mut p = Profile::new("p1", "Acme", 0);
        assert!(p.usable_embedding().is_none());
        p.embedding = Some(Vec::new());
        assert!(p.usable_embedding().is_none());
        p.embedding = Some(vec![1.0, 0.0]);
        assert_eq!(p.usable_embedding(), Some(&[1.0f32, 0.0][..]));
    }
}
