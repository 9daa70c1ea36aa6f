pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::{Chunk, Page};
pub use chunker::{Chunker, ChunkerConfig};
pub use reader::{PlainTextExtractor, TextExtractor};
