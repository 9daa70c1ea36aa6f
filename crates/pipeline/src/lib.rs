pub mod config;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod queue;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::{ChunkingConfig, Neo4jConfig, PipelineConfig};
pub use error::PipelineError;
pub use ledger::{DocumentBatchLedger, DocumentProgressSink};
pub use orchestrator::{
    EnvProviderFactory, PipelineOrchestrator, ProcessRequest, ProviderFactory, RunSummary,
};
pub use queue::ProcessingQueue;
