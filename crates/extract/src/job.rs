use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch_api::{BatchClient, BatchRequest, RemoteBatchState};
use crate::error::ExtractError;
use crate::retry::RetryPolicy;
use crate::schema::ChunkOutcome;

/// Results of a completed batch may be reused by a later run for this long
/// after completion.
pub const REUSE_WINDOW_SECS: u64 = 24 * 3600;

/// Persisted lifecycle of a batch job, as stored on the Document record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchJobStatus {
    Created,
    Submitted,
    Validating,
    InProgress,
    Completed,
    Expired,
    Timeout,
    Failed,
    Cancelled,
}

impl BatchJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Validating => "validating",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Timeout => "timeout",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(Self::Created),
            "submitted" => Some(Self::Submitted),
            "validating" => Some(Self::Validating),
            "in_progress" | "processing" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            "timeout" => Some(Self::Timeout),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Submitted | Self::Validating | Self::InProgress
        )
    }
}

/// Snapshot of the batch fields persisted on a Document by a prior run.
#[derive(Debug, Clone)]
pub struct PersistedBatch {
    pub job_id: String,
    pub status: BatchJobStatus,
    /// Epoch seconds of completion, when status is Completed.
    pub completed_at: Option<u64>,
    /// Chunk count at the time the job was created.
    pub chunk_count: Option<usize>,
}

/// Whether a persisted job from a prior run may stand in for a new
/// submission: still active, or completed recently enough with the same
/// chunk count as this run.
pub fn can_reuse(persisted: &PersistedBatch, chunk_count: usize, now_epoch: u64) -> bool {
    if persisted.job_id.is_empty() {
        return false;
    }
    if persisted.status.is_active() {
        return true;
    }
    if persisted.status == BatchJobStatus::Completed {
        let fresh = persisted
            .completed_at
            .is_some_and(|at| now_epoch.saturating_sub(at) < REUSE_WINDOW_SECS);
        let same_shape = persisted.chunk_count == Some(chunk_count);
        return fresh && same_shape;
    }
    false
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Drives the submit/poll/recover/timeout lifecycle for one remote batch
/// backend. Persistence of job state belongs to the caller, which must
/// store the job id before the first blocking wait.
pub struct BatchJobManager {
    client: Box<dyn BatchClient>,
    poll_initial: Duration,
    poll_max: Duration,
    retry: RetryPolicy,
}

impl BatchJobManager {
    pub fn new(client: Box<dyn BatchClient>) -> Self {
        Self {
            client,
            poll_initial: Duration::from_secs(10),
            poll_max: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_initial = initial;
        self.poll_max = max;
        self
    }

    pub fn supports_recovery(&self) -> bool {
        self.client.supports_recovery()
    }

    /// Submit all chunk requests as one remote job. Transport failures are
    /// retried with bounded backoff before propagating.
    pub async fn submit(&self, requests: &[BatchRequest]) -> Result<String, ExtractError> {
        info!(request_count = requests.len(), "submitting batch job");
        let job_id = self
            .retry
            .run("batch_submit", || self.client.submit(requests))
            .await?;
        info!(job_id = %job_id, "batch job submitted");
        Ok(job_id)
    }

    /// Poll until the job reaches a terminal state, the backend's maximum
    /// wait elapses, or the run is cancelled. Backoff doubles from the
    /// initial interval up to a cap; state transitions are logged only
    /// when the remote state actually changes.
    pub async fn poll(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteBatchState, ExtractError> {
        let started = Instant::now();
        let max_wait = self.client.max_wait();
        let mut interval = self.poll_initial;
        let mut last_state: Option<RemoteBatchState> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            let state = self
                .retry
                .run("batch_status", || self.client.status(job_id))
                .await?;

            if last_state != Some(state) {
                info!(job_id = %job_id, state = state.as_str(), "batch state changed");
                last_state = Some(state);
            }

            if state.is_terminal() {
                info!(
                    job_id = %job_id,
                    state = state.as_str(),
                    elapsed_secs = started.elapsed().as_secs(),
                    "batch job reached terminal state"
                );
                return Ok(state);
            }

            if started.elapsed() >= max_wait {
                warn!(job_id = %job_id, waited_secs = started.elapsed().as_secs(), "batch poll timed out");
                return Err(ExtractError::Timeout {
                    job_id: job_id.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
                _ = sleep(interval) => {}
            }
            interval = std::cmp::min(interval * 2, self.poll_max);
        }
    }

    /// Read a terminal job's output and shape it into per-chunk outcomes.
    /// Request custom ids are `chunk_{index}`; indices without a returned
    /// entry stay Failed.
    pub async fn fetch_results(
        &self,
        job_id: &str,
        total_chunks: usize,
    ) -> Result<Vec<ChunkOutcome>, ExtractError> {
        let entries = self
            .retry
            .run("batch_results", || self.client.results(job_id))
            .await?;

        let mut outcomes: Vec<ChunkOutcome> = (0..total_chunks)
            .map(|i| ChunkOutcome::failed(i, "no result returned for chunk"))
            .collect();

        for entry in entries {
            let Some(index) = entry
                .custom_id
                .strip_prefix("chunk_")
                .and_then(|raw| raw.parse::<usize>().ok())
            else {
                warn!(custom_id = %entry.custom_id, "unrecognized custom id in batch output");
                continue;
            };
            if index >= total_chunks {
                continue;
            }

            outcomes[index] = match entry.body {
                Ok(body) => ChunkOutcome::from_response_text(index, &body),
                Err(message) => ChunkOutcome::failed(index, message),
            };
        }

        Ok(outcomes)
    }

    /// Resume a job persisted by a prior run. Terminal-completed jobs go
    /// straight to results; active jobs resume polling; anything else is a
    /// recovery failure and the caller submits a new job.
    pub async fn recover(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteBatchState, ExtractError> {
        if !self.client.supports_recovery() {
            return Err(ExtractError::Recovery(
                "provider does not support querying historic batch jobs".to_string(),
            ));
        }

        info!(job_id = %job_id, "recovering persisted batch job");
        let state = self
            .client
            .status(job_id)
            .await
            .map_err(|e| ExtractError::Recovery(e.to_string()))?;

        match state {
            RemoteBatchState::Completed => Ok(state),
            s if s.is_active() => self.poll(job_id, cancel).await,
            s => Err(ExtractError::Recovery(format!(
                "batch job is in unusable state: {}",
                s.as_str()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_api::BatchEntry;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBatchClient {
        states: Mutex<Vec<RemoteBatchState>>,
        entries: Vec<BatchEntry>,
        submits: AtomicUsize,
        recoverable: bool,
        max_wait: Duration,
    }

    impl ScriptedBatchClient {
        fn new(states: Vec<RemoteBatchState>, entries: Vec<BatchEntry>) -> Self {
            Self {
                states: Mutex::new(states),
                entries,
                submits: AtomicUsize::new(0),
                recoverable: true,
                max_wait: Duration::from_secs(3600),
            }
        }
    }

    #[async_trait]
    impl BatchClient for ScriptedBatchClient {
        fn supports_recovery(&self) -> bool {
            self.recoverable
        }

        fn max_wait(&self) -> Duration {
            self.max_wait
        }

        async fn submit(&self, _requests: &[BatchRequest]) -> Result<String, ExtractError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok("job_1".to_string())
        }

        async fn status(&self, _job_id: &str) -> Result<RemoteBatchState, ExtractError> {
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.remove(0))
            } else {
                Ok(states[0])
            }
        }

        async fn results(&self, _job_id: &str) -> Result<Vec<BatchEntry>, ExtractError> {
            Ok(self.entries.clone())
        }
    }

    fn fast_manager(client: ScriptedBatchClient) -> BatchJobManager {
        BatchJobManager::new(Box::new(client))
            .with_poll_interval(Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn poll_reaches_completed() {
        let manager = fast_manager(ScriptedBatchClient::new(
            vec![
                RemoteBatchState::Validating,
                RemoteBatchState::InProgress,
                RemoteBatchState::Completed,
            ],
            vec![],
        ));

        let state = manager.poll("job_1", &CancellationToken::new()).await.unwrap();
        assert_eq!(state, RemoteBatchState::Completed);
    }

    #[tokio::test]
    async fn poll_times_out_on_stuck_job() {
        let mut client =
            ScriptedBatchClient::new(vec![RemoteBatchState::InProgress], vec![]);
        client.max_wait = Duration::from_millis(5);
        let manager = fast_manager(client);

        let err = manager
            .poll("job_1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Timeout { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_polling() {
        let manager = fast_manager(ScriptedBatchClient::new(
            vec![RemoteBatchState::InProgress],
            vec![],
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager.poll("job_1", &cancel).await.unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
    }

    #[tokio::test]
    async fn fetch_results_fills_missing_chunks_as_failed() {
        let manager = fast_manager(ScriptedBatchClient::new(
            vec![RemoteBatchState::Completed],
            vec![
                BatchEntry {
                    custom_id: "chunk_0".to_string(),
                    body: Ok(r#"{"nodes":[{"id":"a"}],"relationships":[]}"#.to_string()),
                },
                BatchEntry {
                    custom_id: "chunk_2".to_string(),
                    body: Err("HTTP 500".to_string()),
                },
            ],
        ));

        let outcomes = manager.fetch_results("job_1", 3).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_failed());
        assert!(outcomes[1].is_failed());
        assert!(outcomes[2].is_failed());
    }

    #[tokio::test]
    async fn recover_unsupported_backend_fails() {
        let mut client = ScriptedBatchClient::new(vec![RemoteBatchState::Completed], vec![]);
        client.recoverable = false;
        let manager = fast_manager(client);

        let err = manager
            .recover("job_1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Recovery(_)));
    }

    #[tokio::test]
    async fn recover_completed_job_returns_directly() {
        let manager = fast_manager(ScriptedBatchClient::new(
            vec![RemoteBatchState::Completed],
            vec![],
        ));
        let state = manager
            .recover("job_1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(state, RemoteBatchState::Completed);
    }

    #[test]
    fn reuse_policy_honors_freshness_window_and_snapshot() {
        let now = epoch_secs();
        let base = PersistedBatch {
            job_id: "job_1".to_string(),
            status: BatchJobStatus::Completed,
            completed_at: Some(now - 2 * 3600),
            chunk_count: Some(5),
        };

        // Completed 2h ago, same chunk count: reused.
        assert!(can_reuse(&base, 5, now));

        // Completed 30h ago: stale.
        let stale = PersistedBatch {
            completed_at: Some(now - 30 * 3600),
            ..base.clone()
        };
        assert!(!can_reuse(&stale, 5, now));

        // Chunk count drifted: resubmit.
        assert!(!can_reuse(&base, 6, now));

        // Still active: always resumable.
        let active = PersistedBatch {
            status: BatchJobStatus::InProgress,
            completed_at: None,
            ..base.clone()
        };
        assert!(can_reuse(&active, 99, now));

        // Timed out previously: not reusable.
        let timed_out = PersistedBatch {
            status: BatchJobStatus::Timeout,
            ..base
        };
        assert!(!can_reuse(&timed_out, 5, now));
    }
}
