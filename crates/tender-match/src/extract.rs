//! Document conversion for uploaded files.
//!
//! [`FileConverter`] implements the core [`DocumentConverter`] seam. PDFs go
//! through `pdf-extract`; plain-text files are read as-is. Table extraction
//! is not available for either format, so `tables` is always empty.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

use tender_match_core::indexer::DocumentConverter;
use tender_match_core::models::ExtractedDocument;

/// Extraction error for a single file.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file type: '{}' (expected pdf, txt, or md)", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract text from file bytes, choosing the format from the extension.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => extract_pdf(bytes),
        "txt" | "md" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Converter used by the CLI ingest flows.
pub struct FileConverter;

#[async_trait]
impl DocumentConverter for FileConverter {
    async fn convert(&self, path: &Path) -> Result<ExtractedDocument> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();

        // pdf-extract is CPU-bound and can take seconds on large scans.
        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, &extension))
            .await?
            .with_context(|| format!("Failed to convert {}", path.display()))?;

        Ok(ExtractedDocument {
            text,
            tables: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_text(b"foo", "exe").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedExtension(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", "PDF").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[tokio::test]
    async fn text_file_converts_verbatim() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("capability.txt");
        std::fs::write(&path, "Road construction\n\nBridge repair").unwrap();

        let doc = FileConverter.convert(&path).await.unwrap();
        assert_eq!(doc.text, "Road construction\n\nBridge repair");
        assert!(doc.tables.is_empty());
    }
}
