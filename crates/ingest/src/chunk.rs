use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One page of extracted document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub text: String,
}

impl Page {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// A bounded, ordered slice of a document's text, the unit of extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// 1-based, contiguous across the whole document.
    pub position: usize,
    pub page_number: usize,
}

impl Chunk {
    pub fn new(text: String, position: usize, page_number: usize) -> Self {
        let id = Self::chunk_id(position, &text);
        Self {
            id,
            text,
            position,
            page_number,
        }
    }

    /// Stable identity from (position, text) so an unchanged document
    /// produces identical ids on every run.
    fn chunk_id(position: usize, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(position.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..16])
    }

    pub fn length(&self) -> usize {
        self.text.len()
    }
}
