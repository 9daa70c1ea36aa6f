use unicode_segmentation::UnicodeSegmentation;

use crate::chunk::{Chunk, Page};

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Window size in tokens (words are the token approximation).
    pub target_tokens: usize,
    /// Tokens shared between consecutive chunks.
    pub overlap_tokens: usize,
    /// Hard cap on emitted chunks; the remainder is discarded silently.
    pub max_total_chunks: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        // 10_000 total tokens at 130 per chunk.
        Self {
            target_tokens: 130,
            overlap_tokens: 15,
            max_total_chunks: 10_000 / 130,
        }
    }
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        // Step must move forward, whatever the caller configured.
        let target_tokens = config.target_tokens.max(1);
        let config = ChunkerConfig {
            target_tokens,
            overlap_tokens: config.overlap_tokens.min(target_tokens - 1),
            ..config
        };
        Self { config }
    }

    /// Split extracted pages into an ordered chunk sequence.
    ///
    /// Positions start at 1 and stay contiguous across page boundaries.
    /// Emission stops at `max_total_chunks`; truncation is acceptable
    /// degradation, not an error.
    pub fn chunk_pages(&self, pages: &[Page]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for page in pages {
            if chunks.len() >= self.config.max_total_chunks {
                break;
            }
            self.chunk_page(page, &mut chunks);
        }

        chunks
    }

    fn chunk_page(&self, page: &Page, chunks: &mut Vec<Chunk>) {
        // Word offsets into the original text, so chunk text keeps the
        // document's own spacing and punctuation.
        let words: Vec<(usize, &str)> = page.text.unicode_word_indices().collect();
        if words.is_empty() {
            return;
        }

        let step = self.config.target_tokens - self.config.overlap_tokens;
        let mut start_word = 0;

        while start_word < words.len() {
            if chunks.len() >= self.config.max_total_chunks {
                return;
            }

            let end_word = (start_word + self.config.target_tokens).min(words.len());
            let (slice_start, _) = words[start_word];
            let (last_offset, last_word) = words[end_word - 1];
            let slice_end = last_offset + last_word.len();

            let text = page.text[slice_start..slice_end].to_string();
            if !text.trim().is_empty() {
                chunks.push(Chunk::new(text, chunks.len() + 1, page.number));
            }

            if end_word == words.len() {
                break;
            }
            start_word += step;
        }
    }
}
