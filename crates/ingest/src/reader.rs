use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;

use crate::chunk::Page;

/// Source of extracted document text. Rich formats (PDF, Office) live in
/// external collaborators implementing this trait; the pipeline never
/// parses file formats itself.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn is_supported(&self, path: &Path) -> bool;

    /// Human-readable type for the status surface ("Text File", ...).
    fn file_type(&self, path: &Path) -> String;

    async fn extract_text(&self, path: &Path) -> Result<Vec<Page>>;
}

/// Plain-text extractor for txt/md/csv files.
pub struct PlainTextExtractor;

const PLAIN_EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "Text File"),
    ("md", "Markdown File"),
    ("csv", "CSV File"),
];

impl PlainTextExtractor {
    fn lookup(path: &Path) -> Option<&'static str> {
        let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();
        PLAIN_EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, label)| *label)
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn is_supported(&self, path: &Path) -> bool {
        Self::lookup(path).is_some()
    }

    fn file_type(&self, path: &Path) -> String {
        Self::lookup(path).unwrap_or("Unknown").to_string()
    }

    async fn extract_text(&self, path: &Path) -> Result<Vec<Page>> {
        if !self.is_supported(path) {
            anyhow::bail!("Unsupported file format: {}", path.display());
        }

        let content = fs::read_to_string(path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;

        Ok(vec![Page::new(1, content)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_extensions() {
        let extractor = PlainTextExtractor;
        assert!(extractor.is_supported(Path::new("notes.txt")));
        assert!(extractor.is_supported(Path::new("README.md")));
        assert!(!extractor.is_supported(Path::new("report.pdf")));
        assert_eq!(extractor.file_type(Path::new("data.csv")), "CSV File");
    }
}
