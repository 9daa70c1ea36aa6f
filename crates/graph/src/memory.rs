use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use extract::PersistedBatch;
use ingest::Chunk;

use crate::error::GraphError;
use crate::store::{DocumentRecord, DocumentStatus, DocumentStore, GraphStore};

#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub document_id: String,
    pub chunk: Chunk,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct EntityRow {
    pub label: String,
    pub description: String,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, DocumentRecord>,
    batches: HashMap<String, PersistedBatch>,
    chunks: HashMap<String, ChunkRow>,
    entities: HashMap<String, EntityRow>,
    first_chunks: HashMap<String, String>,
    next_chunks: BTreeSet<(String, String)>,
    chunk_entities: BTreeSet<(String, String)>,
    relationships: BTreeSet<(String, String, String)>,
    progress_log: HashMap<String, Vec<f64>>,
    schema: Option<Option<usize>>,
}

/// In-memory stand-in for the graph database, used by tests that exercise
/// merge and pipeline behavior without a running Neo4j.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, entity_id: &str) -> Option<EntityRow> {
        self.inner.lock().unwrap().entities.get(entity_id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.inner.lock().unwrap().entities.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.lock().unwrap().chunks.len()
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<ChunkRow> {
        self.inner.lock().unwrap().chunks.get(chunk_id).cloned()
    }

    /// HAS_ENTITY edges pointing at the given entity.
    pub fn attachments(&self, entity_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .chunk_entities
            .iter()
            .filter(|(_, e)| e == entity_id)
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn has_relationship(&self, source: &str, rel_type: &str, target: &str) -> bool {
        self.inner.lock().unwrap().relationships.contains(&(
            source.to_string(),
            rel_type.to_string(),
            target.to_string(),
        ))
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.lock().unwrap().relationships.len()
    }

    pub fn next_chunk_pairs(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().next_chunks.iter().cloned().collect()
    }

    pub fn first_chunk(&self, document_id: &str) -> Option<String> {
        self.inner.lock().unwrap().first_chunks.get(document_id).cloned()
    }

    /// Every progress value ever reported for the document, in order.
    pub fn progress_history(&self, document_id: &str) -> Vec<f64> {
        self.inner
            .lock()
            .unwrap()
            .progress_log
            .get(document_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn document(&self, document_id: &str) -> Option<DocumentRecord> {
        self.inner.lock().unwrap().documents.get(document_id).cloned()
    }

    /// Whether `ensure_schema` ran, and the vector dimension it was given.
    pub fn schema(&self) -> Option<Option<usize>> {
        self.inner.lock().unwrap().schema
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn ensure_schema(&self, embedding_dimension: Option<usize>) -> Result<(), GraphError> {
        self.inner.lock().unwrap().schema = Some(embedding_dimension);
        Ok(())
    }

    async fn upsert_chunk(&self, document_id: &str, chunk: &Chunk) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        inner.chunks.insert(
            chunk.id.clone(),
            ChunkRow {
                document_id: document_id.to_string(),
                chunk: chunk.clone(),
                embedding: None,
            },
        );
        Ok(())
    }

    async fn link_first_chunk(&self, document_id: &str, chunk_id: &str) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .first_chunks
            .insert(document_id.to_string(), chunk_id.to_string());
        Ok(())
    }

    async fn link_next_chunk(
        &self,
        prev_chunk_id: &str,
        next_chunk_id: &str,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .next_chunks
            .insert((prev_chunk_id.to_string(), next_chunk_id.to_string()));
        Ok(())
    }

    async fn upsert_entity(
        &self,
        label: &str,
        entity_id: &str,
        description: &str,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        inner.entities.insert(
            entity_id.to_string(),
            EntityRow {
                label: label.to_string(),
                description: description.to_string(),
            },
        );
        Ok(())
    }

    async fn link_chunk_entity(&self, chunk_id: &str, entity_id: &str) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .chunk_entities
            .insert((chunk_id.to_string(), entity_id.to_string()));
        Ok(())
    }

    async fn upsert_relationship(
        &self,
        source_id: &str,
        rel_type: &str,
        target_id: &str,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.entities.contains_key(source_id) || !inner.entities.contains_key(target_id) {
            // Mirrors the MATCH-then-MERGE shape: a missing endpoint is a no-op.
            return Ok(());
        }
        inner.relationships.insert((
            source_id.to_string(),
            rel_type.to_string(),
            target_id.to_string(),
        ));
        Ok(())
    }

    async fn delete_document_chunks(&self, document_id: &str) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        let doomed: Vec<String> = inner
            .chunks
            .iter()
            .filter(|(_, row)| row.document_id == document_id)
            .map(|(id, _)| id.clone())
            .collect();

        for chunk_id in &doomed {
            inner.chunks.remove(chunk_id);
            inner.chunk_entities.retain(|(c, _)| c != chunk_id);
            inner
                .next_chunks
                .retain(|(a, b)| a != chunk_id && b != chunk_id);
        }
        inner.first_chunks.remove(document_id);
        Ok(())
    }

    async fn set_chunk_embedding(
        &self,
        chunk_id: &str,
        embedding: &[f32],
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        let row = inner
            .chunks
            .get_mut(chunk_id)
            .ok_or_else(|| GraphError::Storage(format!("no such chunk: {chunk_id}")))?;
        row.embedding = Some(embedding.to_vec());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn register_document(&self, record: &DocumentRecord) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        inner.documents.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>, GraphError> {
        Ok(self.inner.lock().unwrap().documents.get(document_id).cloned())
    }

    async fn set_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| GraphError::DocumentNotFound(document_id.to_string()))?;
        record.status = status;
        record.error = error.map(str::to_string);
        Ok(())
    }

    async fn set_progress(&self, document_id: &str, progress: f64) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| GraphError::DocumentNotFound(document_id.to_string()))?;
        record.progress = progress;
        inner
            .progress_log
            .entry(document_id.to_string())
            .or_default()
            .push(progress);
        Ok(())
    }

    async fn set_model(&self, document_id: &str, model: &str) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| GraphError::DocumentNotFound(document_id.to_string()))?;
        record.model = Some(model.to_string());
        Ok(())
    }

    async fn set_counters(
        &self,
        document_id: &str,
        total_chunks: usize,
        entity_count: usize,
        relationship_count: usize,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| GraphError::DocumentNotFound(document_id.to_string()))?;
        record.total_chunks = total_chunks;
        record.entity_count = entity_count;
        record.relationship_count = relationship_count;
        Ok(())
    }

    async fn set_summary(&self, document_id: &str, summary: &str) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| GraphError::DocumentNotFound(document_id.to_string()))?;
        record.summary = Some(summary.to_string());
        Ok(())
    }

    async fn load_batch(&self, document_id: &str) -> Result<Option<PersistedBatch>, GraphError> {
        Ok(self.inner.lock().unwrap().batches.get(document_id).cloned())
    }

    async fn save_batch(&self, document_id: &str, batch: &PersistedBatch) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().unwrap();
        inner.batches.insert(document_id.to_string(), batch.clone());
        Ok(())
    }
}
