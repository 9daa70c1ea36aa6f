use async_trait::async_trait;
use neo4rs::{Graph, Query};
use tracing::info;

use extract::{epoch_secs, BatchJobStatus, PersistedBatch};
use ingest::Chunk;

use crate::error::GraphError;
use crate::labels::ENTITY_MARKER;
use crate::store::{DocumentRecord, DocumentStatus, DocumentStore, GraphStore};

/// Neo4j-backed storage for documents, chunks and the entity graph.
///
/// Dynamic labels and relationship types are interpolated into query text
/// (they cannot be parameters); callers must pass only tokens vetted by
/// [`crate::labels`].
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, GraphError> {
        let graph = Graph::new(uri, user, password).await?;
        Ok(Self::new(graph))
    }

    async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await.map_err(GraphError::from)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn ensure_schema(&self, embedding_dimension: Option<usize>) -> Result<(), GraphError> {
        info!("ensuring graph indexes");

        self.run(Query::new(format!(
            "CREATE INDEX entity_id_index IF NOT EXISTS FOR (e:{ENTITY_MARKER}) ON (e.id)",
        )))
        .await?;

        self.run(Query::new(
            "CREATE INDEX chunk_id_index IF NOT EXISTS FOR (c:Chunk) ON (c.id)".to_string(),
        ))
        .await?;

        self.run(Query::new(
            "CREATE INDEX document_id_index IF NOT EXISTS FOR (d:Document) ON (d.id)".to_string(),
        ))
        .await?;

        // Vector index dimensions are part of the index definition and
        // cannot be a parameter.
        if let Some(dimension) = embedding_dimension {
            self.run(Query::new(format!(
                r#"
                CREATE VECTOR INDEX vector IF NOT EXISTS
                FOR (c:Chunk) ON (c.embedding)
                OPTIONS {{indexConfig: {{
                    `vector.dimensions`: {dimension},
                    `vector.similarity_function`: 'cosine'
                }}}}
                "#,
            )))
            .await?;
        }
        Ok(())
    }

    async fn upsert_chunk(&self, document_id: &str, chunk: &Chunk) -> Result<(), GraphError> {
        let query = Query::new(
            r#"
            MATCH (d:Document {id: $document_id})
            MERGE (c:Chunk {id: $chunk_id})
            SET c.text = $text,
                c.position = $position,
                c.length = $length,
                c.page_number = $page_number
            MERGE (c)-[:PART_OF]->(d)
            "#
            .to_string(),
        )
        .param("document_id", document_id.to_string())
        .param("chunk_id", chunk.id.clone())
        .param("text", chunk.text.clone())
        .param("position", chunk.position as i64)
        .param("length", chunk.length() as i64)
        .param("page_number", chunk.page_number as i64);

        self.run(query).await
    }

    async fn link_first_chunk(&self, document_id: &str, chunk_id: &str) -> Result<(), GraphError> {
        let query = Query::new(
            r#"
            MATCH (d:Document {id: $document_id})
            MATCH (c:Chunk {id: $chunk_id})
            MERGE (d)-[:FIRST_CHUNK]->(c)
            "#
            .to_string(),
        )
        .param("document_id", document_id.to_string())
        .param("chunk_id", chunk_id.to_string());

        self.run(query).await
    }

    async fn link_next_chunk(
        &self,
        prev_chunk_id: &str,
        next_chunk_id: &str,
    ) -> Result<(), GraphError> {
        let query = Query::new(
            r#"
            MATCH (prev:Chunk {id: $prev_id})
            MATCH (curr:Chunk {id: $curr_id})
            MERGE (prev)-[:NEXT_CHUNK]->(curr)
            "#
            .to_string(),
        )
        .param("prev_id", prev_chunk_id.to_string())
        .param("curr_id", next_chunk_id.to_string());

        self.run(query).await
    }

    async fn upsert_entity(
        &self,
        label: &str,
        entity_id: &str,
        description: &str,
    ) -> Result<(), GraphError> {
        let query = Query::new(format!(
            r#"
            MERGE (e:`{label}`:{ENTITY_MARKER} {{id: $entity_id}})
            SET e.description = $description
            "#,
        ))
        .param("entity_id", entity_id.to_string())
        .param("description", description.to_string());

        self.run(query).await
    }

    async fn link_chunk_entity(&self, chunk_id: &str, entity_id: &str) -> Result<(), GraphError> {
        let query = Query::new(format!(
            r#"
            MATCH (c:Chunk {{id: $chunk_id}})
            MATCH (e:{ENTITY_MARKER} {{id: $entity_id}})
            MERGE (c)-[:HAS_ENTITY]->(e)
            "#,
        ))
        .param("chunk_id", chunk_id.to_string())
        .param("entity_id", entity_id.to_string());

        self.run(query).await
    }

    async fn upsert_relationship(
        &self,
        source_id: &str,
        rel_type: &str,
        target_id: &str,
    ) -> Result<(), GraphError> {
        let query = Query::new(format!(
            r#"
            MATCH (s:{ENTITY_MARKER} {{id: $source}})
            MATCH (t:{ENTITY_MARKER} {{id: $target}})
            MERGE (s)-[r:`{rel_type}`]->(t)
            "#,
        ))
        .param("source", source_id.to_string())
        .param("target", target_id.to_string());

        self.run(query).await
    }

    async fn delete_document_chunks(&self, document_id: &str) -> Result<(), GraphError> {
        // Entities stay: they may be attached to other documents' chunks.
        let query = Query::new(
            r#"
            MATCH (c:Chunk)-[:PART_OF]->(d:Document {id: $document_id})
            DETACH DELETE c
            "#
            .to_string(),
        )
        .param("document_id", document_id.to_string());

        self.run(query).await
    }

    async fn set_chunk_embedding(
        &self,
        chunk_id: &str,
        embedding: &[f32],
    ) -> Result<(), GraphError> {
        let values: Vec<f64> = embedding.iter().map(|v| *v as f64).collect();
        let query = Query::new(
            r#"
            MATCH (c:Chunk {id: $chunk_id})
            SET c.embedding = $embedding
            "#
            .to_string(),
        )
        .param("chunk_id", chunk_id.to_string())
        .param("embedding", values);

        self.run(query).await
    }
}

#[async_trait]
impl DocumentStore for Neo4jStore {
    async fn register_document(&self, record: &DocumentRecord) -> Result<(), GraphError> {
        let query = Query::new(
            r#"
            MERGE (d:Document {id: $id})
            SET d.filePath = $file_path,
                d.fileType = $file_type,
                d.status = $status,
                d.processingProgress = $progress,
                d.updatedAt = $updated_at
            "#
            .to_string(),
        )
        .param("id", record.id.clone())
        .param("file_path", record.file_path.clone())
        .param("file_type", record.file_type.clone())
        .param("status", record.status.as_str().to_string())
        .param("progress", record.progress)
        .param("updated_at", epoch_secs() as i64);

        self.run(query).await
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>, GraphError> {
        let query = Query::new(
            r#"
            MATCH (d:Document {id: $id})
            RETURN d.filePath as file_path,
                   d.fileType as file_type,
                   d.status as status,
                   d.processingProgress as progress,
                   d.model as model,
                   d.processingError as error,
                   d.total_chunks as total_chunks,
                   d.entityNodeCount as entity_count,
                   d.entityEntityRelCount as relationship_count,
                   d.summary as summary
            "#
            .to_string(),
        )
        .param("id", document_id.to_string());

        let mut rows = self.graph.execute(query).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let status = match row.get::<String>("status").ok().as_deref() {
            Some("Processing") => DocumentStatus::Processing,
            Some("Completed") => DocumentStatus::Completed,
            Some("Failed") => DocumentStatus::Failed,
            _ => DocumentStatus::Pending,
        };

        Ok(Some(DocumentRecord {
            id: document_id.to_string(),
            file_path: row.get::<String>("file_path").unwrap_or_default(),
            file_type: row.get::<String>("file_type").unwrap_or_default(),
            status,
            progress: row.get::<f64>("progress").unwrap_or(0.0),
            model: row.get::<String>("model").ok(),
            error: row.get::<String>("error").ok(),
            total_chunks: row.get::<i64>("total_chunks").unwrap_or(0) as usize,
            entity_count: row.get::<i64>("entity_count").unwrap_or(0) as usize,
            relationship_count: row.get::<i64>("relationship_count").unwrap_or(0) as usize,
            summary: row.get::<String>("summary").ok(),
        }))
    }

    async fn set_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), GraphError> {
        let query = Query::new(
            r#"
            MATCH (d:Document {id: $id})
            SET d.status = $status,
                d.processingError = $error,
                d.updatedAt = $updated_at
            "#
            .to_string(),
        )
        .param("id", document_id.to_string())
        .param("status", status.as_str().to_string())
        .param("error", error.unwrap_or_default().to_string())
        .param("updated_at", epoch_secs() as i64);

        self.run(query).await
    }

    async fn set_progress(&self, document_id: &str, progress: f64) -> Result<(), GraphError> {
        let query = Query::new(
            r#"
            MATCH (d:Document {id: $id})
            SET d.processingProgress = $progress,
                d.updatedAt = $updated_at
            "#
            .to_string(),
        )
        .param("id", document_id.to_string())
        .param("progress", progress)
        .param("updated_at", epoch_secs() as i64);

        self.run(query).await
    }

    async fn set_model(&self, document_id: &str, model: &str) -> Result<(), GraphError> {
        let query = Query::new(
            "MATCH (d:Document {id: $id}) SET d.model = $model".to_string(),
        )
        .param("id", document_id.to_string())
        .param("model", model.to_string());

        self.run(query).await
    }

    async fn set_counters(
        &self,
        document_id: &str,
        total_chunks: usize,
        entity_count: usize,
        relationship_count: usize,
    ) -> Result<(), GraphError> {
        let query = Query::new(
            r#"
            MATCH (d:Document {id: $id})
            SET d.total_chunks = $chunk_count,
                d.chunkNodeCount = $chunk_count,
                d.entityNodeCount = $entity_count,
                d.entityEntityRelCount = $rel_count
            "#
            .to_string(),
        )
        .param("id", document_id.to_string())
        .param("chunk_count", total_chunks as i64)
        .param("entity_count", entity_count as i64)
        .param("rel_count", relationship_count as i64);

        self.run(query).await
    }

    async fn set_summary(&self, document_id: &str, summary: &str) -> Result<(), GraphError> {
        let query = Query::new(
            "MATCH (d:Document {id: $id}) SET d.summary = $summary".to_string(),
        )
        .param("id", document_id.to_string())
        .param("summary", summary.to_string());

        self.run(query).await
    }

    async fn load_batch(&self, document_id: &str) -> Result<Option<PersistedBatch>, GraphError> {
        let query = Query::new(
            r#"
            MATCH (d:Document {id: $id})
            RETURN d.batchId as batch_id,
                   d.batchStatus as batch_status,
                   d.batchCompletedAt as completed_at,
                   d.batchChunkCount as chunk_count
            "#
            .to_string(),
        )
        .param("id", document_id.to_string());

        let mut rows = self.graph.execute(query).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let Some(job_id) = row.get::<String>("batch_id").ok().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let Some(status) = row
            .get::<String>("batch_status")
            .ok()
            .as_deref()
            .and_then(BatchJobStatus::parse)
        else {
            return Ok(None);
        };

        Ok(Some(PersistedBatch {
            job_id,
            status,
            completed_at: row
                .get::<i64>("completed_at")
                .ok()
                .filter(|v| *v >= 0)
                .map(|v| v as u64),
            chunk_count: row
                .get::<i64>("chunk_count")
                .ok()
                .filter(|v| *v >= 0)
                .map(|v| v as usize),
        }))
    }

    async fn save_batch(&self, document_id: &str, batch: &PersistedBatch) -> Result<(), GraphError> {
        let query = Query::new(
            r#"
            MATCH (d:Document {id: $id})
            SET d.batchId = $batch_id,
                d.batchStatus = $batch_status,
                d.batchCompletedAt = $completed_at,
                d.batchChunkCount = $chunk_count
            "#
            .to_string(),
        )
        .param("id", document_id.to_string())
        .param("batch_id", batch.job_id.clone())
        .param("batch_status", batch.status.as_str().to_string())
        .param("completed_at", batch.completed_at.map(|v| v as i64).unwrap_or(-1))
        .param("chunk_count", batch.chunk_count.map(|v| v as i64).unwrap_or(-1));

        self.run(query).await
    }
}
