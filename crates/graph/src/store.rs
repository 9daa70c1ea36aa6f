use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use extract::PersistedBatch;
use ingest::Chunk;

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "Pending",
            DocumentStatus::Processing => "Processing",
            DocumentStatus::Completed => "Completed",
            DocumentStatus::Failed => "Failed",
        }
    }
}

/// The persisted Document record, also the status-polling surface for
/// whatever API layer sits in front of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub file_path: String,
    pub file_type: String,
    pub status: DocumentStatus,
    pub progress: f64,
    pub model: Option<String>,
    pub error: Option<String>,
    pub total_chunks: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub summary: Option<String>,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, file_path: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_path: file_path.into(),
            file_type: file_type.into(),
            status: DocumentStatus::Pending,
            progress: 0.0,
            model: None,
            error: None,
            total_chunks: 0,
            entity_count: 0,
            relationship_count: 0,
            summary: None,
        }
    }
}

/// Writes into the knowledge graph itself. Labels and relationship types
/// passed here must already be validated (see [`crate::labels`]).
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create indexes if missing; a dimension additionally creates the
    /// chunk-embedding vector index.
    async fn ensure_schema(&self, embedding_dimension: Option<usize>) -> Result<(), GraphError>;

    /// Upsert a chunk node and its PART_OF edge to the owning document.
    async fn upsert_chunk(&self, document_id: &str, chunk: &Chunk) -> Result<(), GraphError>;

    async fn link_first_chunk(&self, document_id: &str, chunk_id: &str) -> Result<(), GraphError>;

    async fn link_next_chunk(&self, prev_chunk_id: &str, next_chunk_id: &str) -> Result<(), GraphError>;

    /// Upsert an entity node under `label` plus the shared entity marker.
    async fn upsert_entity(&self, label: &str, entity_id: &str, description: &str) -> Result<(), GraphError>;

    async fn link_chunk_entity(&self, chunk_id: &str, entity_id: &str) -> Result<(), GraphError>;

    /// Upsert an entity-to-entity edge; duplicate triples collapse.
    async fn upsert_relationship(
        &self,
        source_id: &str,
        rel_type: &str,
        target_id: &str,
    ) -> Result<(), GraphError>;

    /// Remove this document's chunk nodes and their edges. Entity nodes and
    /// entity-entity edges stay, they may be shared with other documents.
    async fn delete_document_chunks(&self, document_id: &str) -> Result<(), GraphError>;

    async fn set_chunk_embedding(&self, chunk_id: &str, embedding: &[f32]) -> Result<(), GraphError>;
}

/// Reads and writes Document records and their persisted batch-job state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn register_document(&self, record: &DocumentRecord) -> Result<(), GraphError>;

    async fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>, GraphError>;

    async fn set_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), GraphError>;

    async fn set_progress(&self, document_id: &str, progress: f64) -> Result<(), GraphError>;

    async fn set_model(&self, document_id: &str, model: &str) -> Result<(), GraphError>;

    /// Counters are set to fresh totals, never incremented.
    async fn set_counters(
        &self,
        document_id: &str,
        total_chunks: usize,
        entity_count: usize,
        relationship_count: usize,
    ) -> Result<(), GraphError>;

    async fn set_summary(&self, document_id: &str, summary: &str) -> Result<(), GraphError>;

    async fn load_batch(&self, document_id: &str) -> Result<Option<PersistedBatch>, GraphError>;

    async fn save_batch(&self, document_id: &str, batch: &PersistedBatch) -> Result<(), GraphError>;
}
