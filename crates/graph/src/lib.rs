pub mod embeddings;
pub mod error;
pub mod labels;
pub mod memory;
pub mod merge;
pub mod neo4j;
pub mod store;

pub use embeddings::{EmbeddingProvider, OpenAiEmbeddingClient};
pub use error::GraphError;
pub use labels::{entity_label, normalize_rel_type, ENTITY_MARKER, RESERVED_LABELS};
pub use memory::MemoryStore;
pub use merge::{GraphMergeEngine, MergeTotals};
pub use neo4j::Neo4jStore;
pub use store::{DocumentRecord, DocumentStatus, DocumentStore, GraphStore};
