use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ingest::Chunk;

use crate::batch_api::{BatchRequest, RemoteBatchState};
use crate::error::ExtractError;
use crate::job::{can_reuse, epoch_secs, BatchJobManager, BatchJobStatus, PersistedBatch};
use crate::llm::ChatClient;
use crate::prompt::ExtractionPrompt;
use crate::provider::ExtractionStrategy;
use crate::schema::{ChunkOutcome, ChunkStatus};

/// Receives progress percentages as chunks complete. Implementations
/// persist them to the Document record.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: f64);
}

/// Persisted batch-job state on the Document, written before any blocking
/// wait so a worker crash mid-poll is recoverable.
#[async_trait]
pub trait BatchLedger: Send + Sync {
    async fn load_batch(&self) -> anyhow::Result<Option<PersistedBatch>>;
    async fn batch_submitted(&self, job_id: &str, chunk_count: usize) -> anyhow::Result<()>;
    async fn batch_finished(&self, job_id: &str, status: BatchJobStatus) -> anyhow::Result<()>;
}

/// The percentage range of overall document progress owned by one stage.
#[derive(Debug, Clone, Copy)]
pub struct ProgressBand {
    pub start: f64,
    pub span: f64,
}

impl ProgressBand {
    pub fn at(&self, completed: usize, total: usize) -> f64 {
        if total == 0 {
            return self.start + self.span;
        }
        self.start + self.span * completed as f64 / total as f64
    }
}

/// Aggregate of a whole extraction stage.
#[derive(Debug)]
pub struct ExtractionReport {
    pub outcomes: Vec<ChunkOutcome>,
    pub failed_chunks: Vec<(usize, String)>,
    pub node_total: usize,
    pub edge_total: usize,
}

impl ExtractionReport {
    fn from_outcomes(outcomes: Vec<ChunkOutcome>) -> Self {
        let failed_chunks = outcomes
            .iter()
            .filter(|o| o.is_failed())
            .map(|o| {
                (
                    o.chunk_index,
                    o.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                )
            })
            .collect();
        let node_total = outcomes.iter().map(|o| o.data.nodes.len()).sum();
        let edge_total = outcomes.iter().map(|o| o.data.relationships.len()).sum();
        Self {
            outcomes,
            failed_chunks,
            node_total,
            edge_total,
        }
    }

    /// The document-level failure policy: every chunk failed, or nothing
    /// usable was extracted at all. A partial graph is not fatal.
    pub fn fatal_error(&self) -> Option<String> {
        let total = self.outcomes.len();
        if total > 0 && self.failed_chunks.len() == total {
            let first = truncate(&self.failed_chunks[0].1, 150);
            return Some(format!(
                "all {total} chunks failed extraction; first error: {first}"
            ));
        }
        if self.node_total == 0 {
            return Some(format!("no entities extracted from {total} chunks"));
        }
        None
    }
}

fn truncate(message: &str, max: usize) -> String {
    if message.len() <= max {
        return message.to_string();
    }
    let mut end = max;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

/// Maps an ordered chunk sequence to ordered per-chunk outcomes, never
/// failing the whole document for one bad chunk.
pub struct ExtractionCoordinator {
    strategy: ExtractionStrategy,
    prompt: Arc<ExtractionPrompt>,
    cancel: CancellationToken,
}

impl ExtractionCoordinator {
    pub fn new(
        strategy: ExtractionStrategy,
        prompt: ExtractionPrompt,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            strategy,
            prompt: Arc::new(prompt),
            cancel,
        }
    }

    pub async fn extract_all(
        &self,
        chunks: &[Chunk],
        ledger: &dyn BatchLedger,
        progress: &dyn ProgressSink,
        band: ProgressBand,
    ) -> Result<ExtractionReport, ExtractError> {
        let outcomes = match &self.strategy {
            ExtractionStrategy::Batch(manager) => {
                self.run_batch(manager, chunks, ledger, progress, band).await?
            }
            ExtractionStrategy::BoundedConcurrency {
                client,
                max_in_flight,
            } => {
                self.run_pooled(client.clone(), *max_in_flight, chunks, progress, band)
                    .await?
            }
            ExtractionStrategy::Sequential { client } => {
                self.run_sequential(client.as_ref(), chunks, progress, band)
                    .await?
            }
        };

        let report = ExtractionReport::from_outcomes(outcomes);
        info!(
            chunks = report.outcomes.len(),
            failed = report.failed_chunks.len(),
            nodes = report.node_total,
            edges = report.edge_total,
            "extraction stage finished"
        );
        if !report.failed_chunks.is_empty() {
            warn!(
                failed = report.failed_chunks.len(),
                "some chunks failed extraction, continuing with partial graph"
            );
        }
        Ok(report)
    }

    // -- batch strategy -----------------------------------------------------

    async fn run_batch(
        &self,
        manager: &BatchJobManager,
        chunks: &[Chunk],
        ledger: &dyn BatchLedger,
        progress: &dyn ProgressSink,
        band: ProgressBand,
    ) -> Result<Vec<ChunkOutcome>, ExtractError> {
        let total = chunks.len();

        // A job persisted by a prior run may stand in for a new submission.
        let persisted = ledger
            .load_batch()
            .await
            .map_err(|e| ExtractError::Ledger(e.to_string()))?;

        let recovered = match persisted {
            Some(p) if can_reuse(&p, total, epoch_secs()) => {
                match manager.recover(&p.job_id, &self.cancel).await {
                    Ok(RemoteBatchState::Completed) => {
                        info!(job_id = %p.job_id, "reusing persisted batch job");
                        Some((p.job_id.clone(), RemoteBatchState::Completed))
                    }
                    Ok(state) => Some((p.job_id.clone(), state)),
                    Err(ExtractError::Cancelled) => {
                        self.mark(ledger, &p.job_id, BatchJobStatus::Cancelled).await?;
                        return Err(ExtractError::Cancelled);
                    }
                    Err(ExtractError::Timeout { waited_secs, .. }) => {
                        self.mark(ledger, &p.job_id, BatchJobStatus::Timeout).await?;
                        return Ok(timeout_outcomes(total, &p.job_id, waited_secs));
                    }
                    Err(e) => {
                        warn!(job_id = %p.job_id, error = %e, "batch recovery failed, submitting a new job");
                        None
                    }
                }
            }
            _ => None,
        };

        let (job_id, terminal) = match recovered {
            Some(done) => done,
            None => {
                let requests = build_requests(&self.prompt, chunks);
                let job_id = manager.submit(&requests).await?;

                // Persisted before the blocking wait: a crash mid-poll must
                // not lose the job id.
                ledger
                    .batch_submitted(&job_id, total)
                    .await
                    .map_err(|e| ExtractError::Ledger(e.to_string()))?;

                match manager.poll(&job_id, &self.cancel).await {
                    Ok(state) => (job_id, state),
                    Err(ExtractError::Cancelled) => {
                        self.mark(ledger, &job_id, BatchJobStatus::Cancelled).await?;
                        return Err(ExtractError::Cancelled);
                    }
                    Err(ExtractError::Timeout { waited_secs, .. }) => {
                        self.mark(ledger, &job_id, BatchJobStatus::Timeout).await?;
                        return Ok(timeout_outcomes(total, &job_id, waited_secs));
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        match terminal {
            RemoteBatchState::Completed => {
                self.mark(ledger, &job_id, BatchJobStatus::Completed).await?;
                let outcomes = manager.fetch_results(&job_id, total).await?;

                // Batch entries arrive all at once; walk them so the stage
                // still reports granular progress.
                for (done, _) in outcomes.iter().enumerate() {
                    progress.report(band.at(done + 1, total)).await;
                }
                Ok(outcomes)
            }
            RemoteBatchState::Expired => {
                self.mark(ledger, &job_id, BatchJobStatus::Expired).await?;
                Ok(all_failed(total, "batch job expired"))
            }
            other => {
                self.mark(ledger, &job_id, BatchJobStatus::Failed).await?;
                Ok(all_failed(
                    total,
                    &format!("batch job ended in state {}", other.as_str()),
                ))
            }
        }
    }

    async fn mark(
        &self,
        ledger: &dyn BatchLedger,
        job_id: &str,
        status: BatchJobStatus,
    ) -> Result<(), ExtractError> {
        ledger
            .batch_finished(job_id, status)
            .await
            .map_err(|e| ExtractError::Ledger(e.to_string()))
    }

    // -- bounded-concurrency strategy ---------------------------------------

    async fn run_pooled(
        &self,
        client: Arc<dyn ChatClient>,
        max_in_flight: usize,
        chunks: &[Chunk],
        progress: &dyn ProgressSink,
        band: ProgressBand,
    ) -> Result<Vec<ChunkOutcome>, ExtractError> {
        let total = chunks.len();
        let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
        let mut join_set = JoinSet::new();

        for (index, chunk) in chunks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            let client = client.clone();
            let prompt = self.prompt.clone();
            let semaphore = semaphore.clone();
            let text = chunk.text.clone();

            join_set.spawn(async move {
                // Holds a permit for the whole request, bounding in-flight calls.
                let _permit = semaphore.acquire_owned().await;
                extract_one(client.as_ref(), &prompt, index, &text).await
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while !join_set.is_empty() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    join_set.abort_all();
                    return Err(ExtractError::Cancelled);
                }
                joined = join_set.join_next() => {
                    let Some(joined) = joined else { break };
                    let outcome = joined.unwrap_or_else(|e| {
                        ChunkOutcome::failed(usize::MAX, format!("extraction task panicked: {e}"))
                    });
                    outcomes.push(outcome);
                    progress.report(band.at(outcomes.len(), total)).await;
                }
            }
        }

        // Completion order is arbitrary under the pool; restore document order.
        outcomes.sort_by_key(|o| o.chunk_index);
        Ok(outcomes)
    }

    // -- sequential strategy ------------------------------------------------

    async fn run_sequential(
        &self,
        client: &dyn ChatClient,
        chunks: &[Chunk],
        progress: &dyn ProgressSink,
        band: ProgressBand,
    ) -> Result<Vec<ChunkOutcome>, ExtractError> {
        let total = chunks.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, chunk) in chunks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            let outcome = extract_one(client, &self.prompt, index, &chunk.text).await;
            outcomes.push(outcome);
            progress.report(band.at(index + 1, total)).await;
        }

        Ok(outcomes)
    }
}

fn build_requests(prompt: &ExtractionPrompt, chunks: &[Chunk]) -> Vec<BatchRequest> {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| BatchRequest {
            custom_id: format!("chunk_{index}"),
            system: prompt.system.clone(),
            user: prompt.user_message(&chunk.text),
        })
        .collect()
}

fn all_failed(total: usize, message: &str) -> Vec<ChunkOutcome> {
    (0..total).map(|i| ChunkOutcome::failed(i, message)).collect()
}

fn timeout_outcomes(total: usize, job_id: &str, waited_secs: u64) -> Vec<ChunkOutcome> {
    all_failed(
        total,
        &format!("batch job {job_id} timed out after {waited_secs}s"),
    )
}

/// One chunk, one request. On a request failure, retry exactly once by
/// bisecting the text at the character midpoint and unioning the halves'
/// results; if the split also fails, the chunk is Failed and the run moves on.
async fn extract_one(
    client: &dyn ChatClient,
    prompt: &ExtractionPrompt,
    index: usize,
    text: &str,
) -> ChunkOutcome {
    let first_error = match client.invoke(&prompt.system, &prompt.user_message(text)).await {
        Ok(body) => return ChunkOutcome::from_response_text(index, &body),
        Err(e) => e,
    };

    let Some((left, right)) = bisect(text) else {
        return ChunkOutcome::failed(index, first_error.to_string());
    };

    warn!(
        chunk_index = index,
        error = %first_error,
        "chunk extraction failed, retrying with split chunk"
    );

    let left_result = client.invoke(&prompt.system, &prompt.user_message(left)).await;
    let right_result = client.invoke(&prompt.system, &prompt.user_message(right)).await;

    match (left_result, right_result) {
        (Ok(left_body), Ok(right_body)) => {
            let left = ChunkOutcome::from_response_text(index, &left_body);
            let right = ChunkOutcome::from_response_text(index, &right_body);

            let status = if left.status == ChunkStatus::Success
                && right.status == ChunkStatus::Success
            {
                ChunkStatus::Success
            } else {
                ChunkStatus::ParseError
            };
            let error = left.error.or(right.error);

            let mut data = left.data;
            data.absorb(right.data);

            ChunkOutcome {
                chunk_index: index,
                status,
                data,
                error,
            }
        }
        _ => ChunkOutcome::failed(index, first_error.to_string()),
    }
}

/// Split at the character midpoint, respecting UTF-8 boundaries.
fn bisect(text: &str) -> Option<(&str, &str)> {
    if text.chars().count() < 2 {
        return None;
    }
    let mut mid = text.len() / 2;
    while mid > 0 && !text.is_char_boundary(mid) {
        mid -= 1;
    }
    if mid == 0 {
        return None;
    }
    Some(text.split_at(mid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_api::{BatchClient, BatchEntry};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Scripted chat client: each call pops the next canned response.
    struct ScriptedChat {
        responses: Mutex<Vec<Result<String, ExtractError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedChat {
        fn new(responses: Vec<Result<String, ExtractError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn always_failing() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn invoke(&self, _system: &str, _user: &str) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(ExtractError::Provider("connection refused".to_string()))
            } else {
                responses.remove(0)
            }
        }
    }

    struct NullLedger;

    #[async_trait]
    impl BatchLedger for NullLedger {
        async fn load_batch(&self) -> anyhow::Result<Option<PersistedBatch>> {
            Ok(None)
        }
        async fn batch_submitted(&self, _job_id: &str, _chunk_count: usize) -> anyhow::Result<()> {
            Ok(())
        }
        async fn batch_finished(
            &self,
            _job_id: &str,
            _status: BatchJobStatus,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct RecordingSink {
        values: Mutex<Vec<f64>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                values: Mutex::new(Vec::new()),
            }
        }

        fn recorded(&self) -> Vec<f64> {
            self.values.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn report(&self, progress: f64) {
            self.values.lock().unwrap().push(progress);
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk::new(format!("chunk body number {i}"), i + 1, 1))
            .collect()
    }

    fn node_json(id: &str) -> String {
        format!(r#"{{"nodes":[{{"id":"{id}","type":"Concept"}}],"relationships":[]}}"#)
    }

    const BAND: ProgressBand = ProgressBand {
        start: 20.0,
        span: 60.0,
    };

    #[tokio::test]
    async fn sequential_all_chunks_failing_is_fatal() {
        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::Sequential {
                client: Arc::new(ScriptedChat::always_failing()),
            },
            ExtractionPrompt::default(),
            CancellationToken::new(),
        );

        let report = coordinator
            .extract_all(&chunks(5), &NullLedger, &RecordingSink::new(), BAND)
            .await
            .unwrap();

        assert_eq!(report.failed_chunks.len(), 5);
        let fatal = report.fatal_error().unwrap();
        assert!(fatal.contains("all 5 chunks failed"), "got: {fatal}");
    }

    #[tokio::test]
    async fn sequential_partial_failure_is_not_fatal() {
        // Chunk 3 (index 2) fails its direct call and both split halves;
        // the other four succeed with one entity each.
        let mut responses = Vec::new();
        for i in 0..5 {
            if i == 2 {
                responses.push(Err(ExtractError::Provider("boom".to_string())));
                responses.push(Err(ExtractError::Provider("boom left".to_string())));
                responses.push(Err(ExtractError::Provider("boom right".to_string())));
            } else {
                responses.push(Ok(node_json(&format!("entity_{i}"))));
            }
        }

        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::Sequential {
                client: Arc::new(ScriptedChat::new(responses)),
            },
            ExtractionPrompt::default(),
            CancellationToken::new(),
        );

        let report = coordinator
            .extract_all(&chunks(5), &NullLedger, &RecordingSink::new(), BAND)
            .await
            .unwrap();

        assert_eq!(report.failed_chunks.len(), 1);
        assert_eq!(report.failed_chunks[0].0, 2);
        assert_eq!(report.node_total, 4);
        assert!(report.fatal_error().is_none());
    }

    #[tokio::test]
    async fn split_retry_unions_both_halves() {
        let responses = vec![
            Err(ExtractError::Provider("too large".to_string())),
            Ok(node_json("left_half")),
            Ok(node_json("right_half")),
        ];

        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::Sequential {
                client: Arc::new(ScriptedChat::new(responses)),
            },
            ExtractionPrompt::default(),
            CancellationToken::new(),
        );

        let report = coordinator
            .extract_all(&chunks(1), &NullLedger, &RecordingSink::new(), BAND)
            .await
            .unwrap();

        assert!(report.failed_chunks.is_empty());
        assert_eq!(report.node_total, 2);
        let ids: Vec<&str> = report.outcomes[0]
            .data
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["left_half", "right_half"]);
    }

    #[tokio::test]
    async fn progress_is_monotone_and_banded() {
        let responses = (0..4).map(|i| Ok(node_json(&format!("e{i}")))).collect();
        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::Sequential {
                client: Arc::new(ScriptedChat::new(responses)),
            },
            ExtractionPrompt::default(),
            CancellationToken::new(),
        );

        let sink = RecordingSink::new();
        coordinator
            .extract_all(&chunks(4), &NullLedger, &sink, BAND)
            .await
            .unwrap();

        let values = sink.recorded();
        assert_eq!(values.len(), 4);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!((values[0] - 35.0).abs() < 1e-9);
        assert!((values[3] - 80.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn pooled_outcomes_come_back_in_document_order() {
        let responses = (0..6).map(|i| Ok(node_json(&format!("e{i}")))).collect();
        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::BoundedConcurrency {
                client: Arc::new(ScriptedChat::new(responses)),
                max_in_flight: 3,
            },
            ExtractionPrompt::default(),
            CancellationToken::new(),
        );

        let report = coordinator
            .extract_all(&chunks(6), &NullLedger, &RecordingSink::new(), BAND)
            .await
            .unwrap();

        let indices: Vec<usize> = report.outcomes.iter().map(|o| o.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn cancelled_sequential_run_stops_early() {
        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::Sequential {
                client: Arc::new(ScriptedChat::always_failing()),
            },
            ExtractionPrompt::default(),
            {
                let token = CancellationToken::new();
                token.cancel();
                token
            },
        );

        let err = coordinator
            .extract_all(&chunks(3), &NullLedger, &RecordingSink::new(), BAND)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
    }

    // -- batch strategy through a scripted client ---------------------------

    struct ScriptedBatch {
        submits: Arc<AtomicUsize>,
        state: RemoteBatchState,
        entries: Vec<BatchEntry>,
    }

    #[async_trait]
    impl BatchClient for ScriptedBatch {
        fn max_wait(&self) -> Duration {
            Duration::from_secs(3600)
        }

        async fn submit(&self, _requests: &[BatchRequest]) -> Result<String, ExtractError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok("job_9".to_string())
        }

        async fn status(&self, _job_id: &str) -> Result<RemoteBatchState, ExtractError> {
            Ok(self.state)
        }

        async fn results(&self, _job_id: &str) -> Result<Vec<BatchEntry>, ExtractError> {
            Ok(self.entries.clone())
        }
    }

    struct MemoryLedger {
        persisted: Mutex<Option<PersistedBatch>>,
    }

    impl MemoryLedger {
        fn empty() -> Self {
            Self {
                persisted: Mutex::new(None),
            }
        }

        fn with(batch: PersistedBatch) -> Self {
            Self {
                persisted: Mutex::new(Some(batch)),
            }
        }
    }

    #[async_trait]
    impl BatchLedger for MemoryLedger {
        async fn load_batch(&self) -> anyhow::Result<Option<PersistedBatch>> {
            Ok(self.persisted.lock().unwrap().clone())
        }

        async fn batch_submitted(&self, job_id: &str, chunk_count: usize) -> anyhow::Result<()> {
            *self.persisted.lock().unwrap() = Some(PersistedBatch {
                job_id: job_id.to_string(),
                status: BatchJobStatus::Submitted,
                completed_at: None,
                chunk_count: Some(chunk_count),
            });
            Ok(())
        }

        async fn batch_finished(
            &self,
            job_id: &str,
            status: BatchJobStatus,
        ) -> anyhow::Result<()> {
            let mut persisted = self.persisted.lock().unwrap();
            *persisted = Some(PersistedBatch {
                job_id: job_id.to_string(),
                status,
                completed_at: Some(epoch_secs()),
                chunk_count: persisted.as_ref().and_then(|p| p.chunk_count),
            });
            Ok(())
        }
    }

    fn batch_entries(n: usize) -> Vec<BatchEntry> {
        (0..n)
            .map(|i| BatchEntry {
                custom_id: format!("chunk_{i}"),
                body: Ok(node_json(&format!("e{i}"))),
            })
            .collect()
    }

    #[tokio::test]
    async fn batch_run_persists_job_then_fetches_results() {
        let client = ScriptedBatch {
            submits: Arc::new(AtomicUsize::new(0)),
            state: RemoteBatchState::Completed,
            entries: batch_entries(3),
        };
        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::Batch(BatchJobManager::new(Box::new(client))),
            ExtractionPrompt::default(),
            CancellationToken::new(),
        );

        let ledger = MemoryLedger::empty();
        let report = coordinator
            .extract_all(&chunks(3), &ledger, &RecordingSink::new(), BAND)
            .await
            .unwrap();

        assert_eq!(report.node_total, 3);
        assert!(report.failed_chunks.is_empty());
        let persisted = ledger.persisted.lock().unwrap().clone().unwrap();
        assert_eq!(persisted.job_id, "job_9");
        assert_eq!(persisted.status, BatchJobStatus::Completed);
        assert_eq!(persisted.chunk_count, Some(3));
    }

    #[tokio::test]
    async fn fresh_completed_batch_is_reused_without_resubmitting() {
        let submits = Arc::new(AtomicUsize::new(0));
        let client = ScriptedBatch {
            submits: submits.clone(),
            state: RemoteBatchState::Completed,
            entries: batch_entries(2),
        };
        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::Batch(BatchJobManager::new(Box::new(client))),
            ExtractionPrompt::default(),
            CancellationToken::new(),
        );

        let ledger = MemoryLedger::with(PersistedBatch {
            job_id: "old_job".to_string(),
            status: BatchJobStatus::Completed,
            completed_at: Some(epoch_secs() - 2 * 3600),
            chunk_count: Some(2),
        });

        let report = coordinator
            .extract_all(&chunks(2), &ledger, &RecordingSink::new(), BAND)
            .await
            .unwrap();

        assert_eq!(report.node_total, 2);
        // No new submission happened.
        assert_eq!(submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_completed_batch_forces_resubmission() {
        let submits = Arc::new(AtomicUsize::new(0));
        let client = ScriptedBatch {
            submits: submits.clone(),
            state: RemoteBatchState::Completed,
            entries: batch_entries(2),
        };
        let coordinator = ExtractionCoordinator::new(
            ExtractionStrategy::Batch(BatchJobManager::new(Box::new(client))),
            ExtractionPrompt::default(),
            CancellationToken::new(),
        );

        let ledger = MemoryLedger::with(PersistedBatch {
            job_id: "old_job".to_string(),
            status: BatchJobStatus::Completed,
            completed_at: Some(epoch_secs() - 30 * 3600),
            chunk_count: Some(2),
        });

        coordinator
            .extract_all(&chunks(2), &ledger, &RecordingSink::new(), BAND)
            .await
            .unwrap();

        assert_eq!(submits.load(Ordering::SeqCst), 1);
        assert_eq!(
            ledger.persisted.lock().unwrap().clone().unwrap().job_id,
            "job_9"
        );
    }
}
