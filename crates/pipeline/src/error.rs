use thiserror::Error;

use extract::ExtractError;
use graph::GraphError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unknown provider or unsupported file type; nothing ran.
    #[error("validation error: {0}")]
    Validation(String),

    /// Every chunk failed, or the whole document yielded zero entities.
    #[error("extraction produced no usable graph: {0}")]
    FatalExtraction(String),

    #[error(transparent)]
    Storage(#[from] GraphError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("processing cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(String),
}
