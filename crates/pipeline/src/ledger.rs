use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use extract::{epoch_secs, BatchJobStatus, BatchLedger, PersistedBatch, ProgressSink};
use graph::DocumentStore;

/// Stores batch-job state on the owning Document record.
pub struct DocumentBatchLedger {
    store: Arc<dyn DocumentStore>,
    document_id: String,
}

impl DocumentBatchLedger {
    pub fn new(store: Arc<dyn DocumentStore>, document_id: impl Into<String>) -> Self {
        Self {
            store,
            document_id: document_id.into(),
        }
    }
}

#[async_trait]
impl BatchLedger for DocumentBatchLedger {
    async fn load_batch(&self) -> anyhow::Result<Option<PersistedBatch>> {
        Ok(self.store.load_batch(&self.document_id).await?)
    }

    async fn batch_submitted(&self, job_id: &str, chunk_count: usize) -> anyhow::Result<()> {
        let batch = PersistedBatch {
            job_id: job_id.to_string(),
            status: BatchJobStatus::Submitted,
            completed_at: None,
            chunk_count: Some(chunk_count),
        };
        self.store.save_batch(&self.document_id, &batch).await?;
        Ok(())
    }

    async fn batch_finished(&self, job_id: &str, status: BatchJobStatus) -> anyhow::Result<()> {
        let existing = self.store.load_batch(&self.document_id).await?;
        // The reuse window is anchored to when the job actually completed;
        // re-marking a recovered job must not restart it.
        let first_completed_at = existing
            .as_ref()
            .filter(|b| b.job_id == job_id)
            .and_then(|b| b.completed_at);
        let batch = PersistedBatch {
            job_id: job_id.to_string(),
            status,
            completed_at: (status == BatchJobStatus::Completed)
                .then(|| first_completed_at.unwrap_or_else(epoch_secs)),
            chunk_count: existing.and_then(|b| b.chunk_count),
        };
        self.store.save_batch(&self.document_id, &batch).await?;
        Ok(())
    }
}

/// Persists progress on the Document, clamped so observed values never go
/// backwards within a run.
pub struct DocumentProgressSink {
    store: Arc<dyn DocumentStore>,
    document_id: String,
    last: Mutex<f64>,
}

impl DocumentProgressSink {
    pub fn new(store: Arc<dyn DocumentStore>, document_id: impl Into<String>) -> Self {
        Self {
            store,
            document_id: document_id.into(),
            last: Mutex::new(0.0),
        }
    }
}

#[async_trait]
impl ProgressSink for DocumentProgressSink {
    async fn report(&self, progress: f64) {
        let clamped = {
            let mut last = self.last.lock().await;
            if progress <= *last {
                return;
            }
            *last = progress.min(100.0);
            *last
        };

        // A progress write failure never fails the run.
        if let Err(e) = self.store.set_progress(&self.document_id, clamped).await {
            warn!(document_id = %self.document_id, error = %e, "failed to persist progress");
        }
    }
}
