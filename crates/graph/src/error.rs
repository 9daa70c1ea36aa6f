use thiserror::Error;

/// Errors from the persistent graph layer. Unlike extraction, storage
/// failures are fatal to a run: a merge either fully applies or the whole
/// run is retried.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("invalid label token: {0:?}")]
    InvalidLabel(String),
}

impl From<neo4rs::Error> for GraphError {
    fn from(e: neo4rs::Error) -> Self {
        GraphError::Storage(e.to_string())
    }
}
