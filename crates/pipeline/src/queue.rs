use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::orchestrator::{PipelineOrchestrator, ProcessRequest};

/// Fire-and-forget background processing with one cancellation token per
/// active run. A document can hold at most one active run at a time.
pub struct ProcessingQueue {
    orchestrator: Arc<PipelineOrchestrator>,
    active: Arc<DashMap<String, CancellationToken>>,
}

impl ProcessingQueue {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self {
            orchestrator,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Spawn a pipeline run for the document. A second enqueue while a run
    /// is active is dropped with a warning.
    pub fn enqueue(&self, request: ProcessRequest) {
        let document_id = request.document_id.clone();
        if self.active.contains_key(&document_id) {
            warn!(document_id = %document_id, "document already has an active run, ignoring enqueue");
            return;
        }

        let token = CancellationToken::new();
        self.active.insert(document_id.clone(), token.clone());

        let orchestrator = self.orchestrator.clone();
        let active = self.active.clone();
        tokio::spawn(async move {
            match orchestrator.process(&request, &token).await {
                Ok(summary) => {
                    info!(
                        document_id = %summary.document_id,
                        chunks = summary.chunk_count,
                        entities = summary.entity_count,
                        relationships = summary.relationship_count,
                        "pipeline run finished"
                    );
                }
                Err(e) => {
                    error!(document_id = %document_id, error = %e, "pipeline run failed");
                }
            }
            active.remove(&document_id);
        });
    }

    /// Signal the document's active run to stop at its next checkpoint.
    /// Returns false when no run is active.
    pub fn cancel(&self, document_id: &str) -> bool {
        match self.active.get(document_id) {
            Some(token) => {
                info!(document_id = %document_id, "cancelling active run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, document_id: &str) -> bool {
        self.active.contains_key(document_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
