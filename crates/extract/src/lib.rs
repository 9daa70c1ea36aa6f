pub mod batch_api;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod llm;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod schema;

pub use batch_api::{AnthropicBatchClient, BatchClient, BatchEntry, BatchRequest, OpenAiBatchClient, RemoteBatchState};
pub use coordinator::{BatchLedger, ExtractionCoordinator, ExtractionReport, ProgressBand, ProgressSink};
pub use error::ExtractError;
pub use job::{epoch_secs, BatchJobManager, BatchJobStatus, PersistedBatch, REUSE_WINDOW_SECS};
pub use llm::{AnthropicChatClient, ChatClient, OpenAiCompatClient};
pub use prompt::ExtractionPrompt;
pub use provider::{ExtractionStrategy, ProviderKind, ProviderSettings, SUPPORTED_PROVIDERS};
pub use retry::RetryPolicy;
pub use schema::{ChunkOutcome, ChunkStatus, GraphEdge, GraphNode, GraphPayload, Properties};
