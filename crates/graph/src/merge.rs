use tracing::{info, warn};

use extract::ChunkOutcome;
use ingest::Chunk;

use crate::error::GraphError;
use crate::labels::{entity_label, normalize_rel_type};
use crate::store::GraphStore;

/// Totals from one merge pass, as occurrence counts. These feed the
/// Document counters directly, replacing whatever a prior run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeTotals {
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
}

/// Applies per-chunk extraction payloads into the persistent graph.
///
/// The merge is idempotent: chunk identity is content-derived and every
/// write is an upsert, so re-running over unchanged input converges to the
/// same graph. Unlike extraction this stage is not partial-failure
/// tolerant; the first storage error aborts the run.
pub struct GraphMergeEngine<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> GraphMergeEngine<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    pub async fn merge_document(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        outcomes: &[ChunkOutcome],
    ) -> Result<MergeTotals, GraphError> {
        // Reprocessing drops this document's chunk nodes first. Entity nodes
        // and entity-entity edges survive, they may belong to other documents.
        self.store.delete_document_chunks(document_id).await?;

        // Chunk nodes and the sequence links, strictly in position order.
        for (i, chunk) in chunks.iter().enumerate() {
            self.store.upsert_chunk(document_id, chunk).await?;
            if i == 0 {
                self.store.link_first_chunk(document_id, &chunk.id).await?;
            } else {
                self.store
                    .link_next_chunk(&chunks[i - 1].id, &chunk.id)
                    .await?;
            }
        }

        let mut totals = MergeTotals {
            chunk_count: chunks.len(),
            ..MergeTotals::default()
        };

        for outcome in outcomes {
            let chunk_id = chunks.get(outcome.chunk_index).map(|c| c.id.as_str());

            for node in &outcome.data.nodes {
                if node.id.is_empty() {
                    continue;
                }
                let label = match entity_label(&node.node_type) {
                    Ok(label) => label,
                    Err(e) => {
                        warn!(entity_id = %node.id, error = %e, "skipping entity with unusable type");
                        continue;
                    }
                };

                self.store
                    .upsert_entity(&label, &node.id, &node.properties.description)
                    .await?;
                if let Some(chunk_id) = chunk_id {
                    self.store.link_chunk_entity(chunk_id, &node.id).await?;
                }
                totals.entity_count += 1;
            }

            for edge in &outcome.data.relationships {
                if edge.source.is_empty() || edge.target.is_empty() {
                    continue;
                }
                let rel_type = match normalize_rel_type(&edge.edge_type) {
                    Ok(token) => token,
                    Err(e) => {
                        warn!(source = %edge.source, target = %edge.target, error = %e,
                            "skipping relationship with unusable type");
                        continue;
                    }
                };

                self.store
                    .upsert_relationship(&edge.source, &rel_type, &edge.target)
                    .await?;
                totals.relationship_count += 1;
            }
        }

        info!(
            document_id = %document_id,
            chunks = totals.chunk_count,
            entities = totals.entity_count,
            relationships = totals.relationship_count,
            "graph merge applied"
        );
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use extract::{GraphEdge, GraphNode, GraphPayload};

    fn chunks(document: &str, n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk::new(format!("{document} text {i}"), i + 1, 1))
            .collect()
    }

    fn node(id: &str, node_type: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            node_type: node_type.to_string(),
            properties: Default::default(),
        }
    }

    fn edge(source: &str, edge_type: &str, target: &str) -> GraphEdge {
        GraphEdge {
            source: source.to_string(),
            edge_type: edge_type.to_string(),
            target: target.to_string(),
            properties: Default::default(),
        }
    }

    fn outcome(index: usize, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> ChunkOutcome {
        ChunkOutcome::success(
            index,
            GraphPayload {
                nodes,
                relationships: edges,
            },
        )
    }

    #[tokio::test]
    async fn builds_chunk_sequence_in_position_order() {
        let store = MemoryStore::new();
        let engine = GraphMergeEngine::new(&store);
        let chunks = chunks("doc_a", 3);

        engine.merge_document("doc_a", &chunks, &[]).await.unwrap();

        assert_eq!(store.first_chunk("doc_a"), Some(chunks[0].id.clone()));
        let pairs = store.next_chunk_pairs();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&(chunks[0].id.clone(), chunks[1].id.clone())));
        assert!(pairs.contains(&(chunks[1].id.clone(), chunks[2].id.clone())));
    }

    #[tokio::test]
    async fn reserved_entity_type_lands_under_renamed_label() {
        let store = MemoryStore::new();
        let engine = GraphMergeEngine::new(&store);
        let chunks = chunks("doc_a", 1);
        let outcomes = vec![outcome(0, vec![node("report_2024", "Document")], vec![])];

        engine
            .merge_document("doc_a", &chunks, &outcomes)
            .await
            .unwrap();

        assert_eq!(store.entity("report_2024").unwrap().label, "DocumentEntity");
    }

    #[tokio::test]
    async fn relationship_types_are_normalized_and_deduplicated() {
        let store = MemoryStore::new();
        let engine = GraphMergeEngine::new(&store);
        let chunks = chunks("doc_a", 1);
        let outcomes = vec![outcome(
            0,
            vec![node("wheel", "Part"), node("car", "Machine")],
            vec![
                edge("wheel", "is part of", "car"),
                edge("wheel", "IS_PART_OF", "car"),
            ],
        )];

        let totals = engine
            .merge_document("doc_a", &chunks, &outcomes)
            .await
            .unwrap();

        assert!(store.has_relationship("wheel", "IS_PART_OF", "car"));
        assert_eq!(store.relationship_count(), 1);
        // Occurrence count, matching what the Document counters report.
        assert_eq!(totals.relationship_count, 2);
    }

    #[tokio::test]
    async fn edges_with_missing_endpoints_are_skipped() {
        let store = MemoryStore::new();
        let engine = GraphMergeEngine::new(&store);
        let chunks = chunks("doc_a", 1);
        let outcomes = vec![outcome(
            0,
            vec![node("alpha", "Concept")],
            vec![edge("", "RELATES", "alpha"), edge("alpha", "RELATES", "")],
        )];

        let totals = engine
            .merge_document("doc_a", &chunks, &outcomes)
            .await
            .unwrap();

        assert_eq!(totals.relationship_count, 0);
        assert_eq!(store.relationship_count(), 0);
    }

    #[tokio::test]
    async fn remerging_unchanged_content_converges() {
        let store = MemoryStore::new();
        let engine = GraphMergeEngine::new(&store);
        let chunks = chunks("doc_a", 2);
        let outcomes = vec![
            outcome(0, vec![node("alpha", "Concept")], vec![]),
            outcome(1, vec![node("beta", "Concept")], vec![]),
        ];

        let first = engine
            .merge_document("doc_a", &chunks, &outcomes)
            .await
            .unwrap();
        let second = engine
            .merge_document("doc_a", &chunks, &outcomes)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.entity_count(), 2);
    }

    #[tokio::test]
    async fn shared_entity_across_documents_merges_into_one_node() {
        let store = MemoryStore::new();
        let engine = GraphMergeEngine::new(&store);

        let chunks_a = chunks("doc_a", 1);
        let chunks_b = chunks("doc_b", 1);
        let outcomes_a = vec![outcome(0, vec![node("acme_corp", "Organization")], vec![])];
        let outcomes_b = vec![outcome(0, vec![node("acme_corp", "Organization")], vec![])];

        engine
            .merge_document("doc_a", &chunks_a, &outcomes_a)
            .await
            .unwrap();
        engine
            .merge_document("doc_b", &chunks_b, &outcomes_b)
            .await
            .unwrap();

        assert_eq!(store.entity_count(), 1);
        let attachments = store.attachments("acme_corp");
        assert_eq!(attachments.len(), 2);
        assert!(attachments.contains(&chunks_a[0].id));
        assert!(attachments.contains(&chunks_b[0].id));
    }

    #[tokio::test]
    async fn reprocessing_keeps_entities_but_replaces_chunks() {
        let store = MemoryStore::new();
        let engine = GraphMergeEngine::new(&store);

        let old_chunks = chunks("doc_a", 2);
        let outcomes = vec![outcome(0, vec![node("alpha", "Concept")], vec![])];
        engine
            .merge_document("doc_a", &old_chunks, &outcomes)
            .await
            .unwrap();

        // New content, new chunk identities.
        let new_chunks: Vec<Chunk> = (0..3)
            .map(|i| Chunk::new(format!("revised text {i}"), i + 1, 1))
            .collect();
        let new_outcomes = vec![outcome(0, vec![node("alpha", "Concept")], vec![])];
        engine
            .merge_document("doc_a", &new_chunks, &new_outcomes)
            .await
            .unwrap();

        assert_eq!(store.chunk_count(), 3);
        for old in &old_chunks {
            assert!(store.chunk(&old.id).is_none());
        }
        assert!(store.entity("alpha").is_some());
        assert_eq!(store.attachments("alpha"), vec![new_chunks[0].id.clone()]);
    }
}
