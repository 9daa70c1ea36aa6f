use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Transport or HTTP failure talking to a language-model backend.
    #[error("provider request failed: {0}")]
    Provider(String),

    #[error("batch job {job_id} did not complete within {waited_secs}s")]
    Timeout { job_id: String, waited_secs: u64 },

    /// A persisted batch job could not be resumed; the caller should
    /// submit a new one.
    #[error("batch job cannot be recovered: {0}")]
    Recovery(String),

    /// Persisting batch state to the document record failed. Fatal, since
    /// an unpersisted job id would be orphaned by a worker crash.
    #[error("failed to persist batch state: {0}")]
    Ledger(String),

    #[error("extraction cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        ExtractError::Provider(err.to_string())
    }
}
