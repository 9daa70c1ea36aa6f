use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use extract::{
    ChatClient, ExtractError, ExtractionCoordinator, ExtractionPrompt, ExtractionStrategy,
    ProgressBand, ProgressSink, ProviderKind, ProviderSettings, SUPPORTED_PROVIDERS,
};
use graph::{
    DocumentStatus, DocumentStore, EmbeddingProvider, GraphMergeEngine, GraphStore,
};
use ingest::{Chunker, TextExtractor};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::ledger::{DocumentBatchLedger, DocumentProgressSink};

/// Progress bands per stage: chunking 0-20, extraction 20-80, graph merge
/// 80-95, embeddings and summary 95-100.
const EXTRACTION_BAND: ProgressBand = ProgressBand {
    start: 20.0,
    span: 60.0,
};

/// How much document text feeds the summary request.
const SUMMARY_INPUT_CHARS: usize = 4000;

const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub document_id: String,
    pub file_path: PathBuf,
    pub provider: String,
    pub extraction_prompt: Option<String>,
}

/// Task result record handed back to whatever queued the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub document_id: String,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub error: Option<String>,
}

/// Builds per-run provider machinery. The environment-backed implementation
/// is the production path; tests supply scripted clients.
pub trait ProviderFactory: Send + Sync {
    fn strategy(&self, kind: ProviderKind) -> ExtractionStrategy;

    fn summary_client(&self, kind: ProviderKind) -> Option<Arc<dyn ChatClient>>;
}

pub struct EnvProviderFactory {
    settings: ProviderSettings,
}

impl EnvProviderFactory {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

impl ProviderFactory for EnvProviderFactory {
    fn strategy(&self, kind: ProviderKind) -> ExtractionStrategy {
        kind.strategy(&self.settings)
    }

    fn summary_client(&self, kind: ProviderKind) -> Option<Arc<dyn ChatClient>> {
        Some(kind.chat_client(&self.settings))
    }
}

/// Drives one document through chunking, extraction, graph merge and
/// embeddings, persisting status and progress on the Document record at
/// every step.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    document_store: Arc<dyn DocumentStore>,
    graph_store: Arc<dyn GraphStore>,
    extractors: Vec<Box<dyn TextExtractor>>,
    providers: Box<dyn ProviderFactory>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        document_store: Arc<dyn DocumentStore>,
        graph_store: Arc<dyn GraphStore>,
        extractors: Vec<Box<dyn TextExtractor>>,
        providers: Box<dyn ProviderFactory>,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            config,
            document_store,
            graph_store,
            extractors,
            providers,
            embeddings,
        }
    }

    /// Run the whole pipeline for one document. On failure the Document is
    /// marked Failed with a bounded message before the error propagates to
    /// the queue.
    pub async fn process(
        &self,
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        match self.run(request, cancel).await {
            Ok(summary) => Ok(summary),
            // Validation rejections happen before the run touches the
            // document; in particular, a duplicate run must not overwrite
            // the live run's Processing status with Failed.
            Err(e @ PipelineError::Validation(_)) => Err(e),
            Err(e) => {
                let message = truncate(&e.to_string(), MAX_ERROR_CHARS);
                if let Err(store_err) = self
                    .document_store
                    .set_status(&request.document_id, DocumentStatus::Failed, Some(&message))
                    .await
                {
                    warn!(
                        document_id = %request.document_id,
                        error = %store_err,
                        "failed to persist failure status"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let document_id = request.document_id.as_str();

        // Validation happens before any stage runs or any state changes.
        let kind = ProviderKind::parse(&request.provider).ok_or_else(|| {
            PipelineError::Validation(format!(
                "unsupported provider '{}', expected one of: {}",
                request.provider,
                SUPPORTED_PROVIDERS.join(", ")
            ))
        })?;

        let document = self
            .document_store
            .get_document(document_id)
            .await?
            .ok_or_else(|| PipelineError::Validation(format!("unknown document: {document_id}")))?;
        if document.status == DocumentStatus::Processing {
            return Err(PipelineError::Validation(format!(
                "document is already being processed: {document_id}"
            )));
        }

        let extractor = self
            .extractors
            .iter()
            .find(|e| e.is_supported(&request.file_path))
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "unsupported file type: {}",
                    request.file_path.display()
                ))
            })?;

        info!(document_id = %document_id, provider = kind.as_str(), "starting document processing");
        self.document_store.set_model(document_id, kind.as_str()).await?;
        self.document_store
            .set_status(document_id, DocumentStatus::Processing, None)
            .await?;
        self.document_store.set_progress(document_id, 0.0).await?;

        let progress = DocumentProgressSink::new(self.document_store.clone(), document_id);

        // Stage 1: chunking (0-20).
        progress.report(5.0).await;
        let pages = extractor
            .extract_text(&request.file_path)
            .await
            .map_err(|e| PipelineError::Io(e.to_string()))?;
        progress.report(10.0).await;

        let chunker = Chunker::new(self.config.chunker_config());
        let chunks = chunker.chunk_pages(&pages);
        info!(document_id = %document_id, chunks = chunks.len(), "chunking finished");
        progress.report(20.0).await;

        // Stage 2: extraction (20-80).
        let coordinator = ExtractionCoordinator::new(
            self.providers.strategy(kind),
            ExtractionPrompt::custom(request.extraction_prompt.clone()),
            cancel.clone(),
        );
        let ledger = DocumentBatchLedger::new(self.document_store.clone(), document_id);

        let report = coordinator
            .extract_all(&chunks, &ledger, &progress, EXTRACTION_BAND)
            .await
            .map_err(|e| match e {
                ExtractError::Cancelled => PipelineError::Cancelled,
                other => PipelineError::Extract(other),
            })?;

        if let Some(message) = report.fatal_error() {
            return Err(PipelineError::FatalExtraction(message));
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Stage 3: graph merge (80-95). Not partial-failure tolerant; the
        // first storage error aborts the run.
        progress.report(82.0).await;
        let engine = GraphMergeEngine::new(self.graph_store.as_ref());
        let totals = engine
            .merge_document(document_id, &chunks, &report.outcomes)
            .await?;
        progress.report(88.0).await;

        self.document_store
            .set_counters(
                document_id,
                totals.chunk_count,
                totals.entity_count,
                totals.relationship_count,
            )
            .await?;
        progress.report(95.0).await;

        // Stage 4: embeddings and summary (95-100). The plain indexes are
        // needed with or without an embedding provider.
        self.graph_store
            .ensure_schema(self.embeddings.as_ref().map(|e| e.dimension()))
            .await?;
        if let Some(embedder) = &self.embeddings {
            for chunk in &chunks {
                match embedder.embed(&chunk.text).await {
                    Ok(vector) => {
                        self.graph_store.set_chunk_embedding(&chunk.id, &vector).await?;
                    }
                    Err(e) => {
                        // A chunk without an embedding only degrades search.
                        warn!(chunk_id = %chunk.id, error = %e, "embedding generation failed");
                    }
                }
            }
        }

        if let Some(client) = self.providers.summary_client(kind) {
            self.write_summary(document_id, &pages, client.as_ref()).await;
        }

        progress.report(100.0).await;
        self.document_store
            .set_status(document_id, DocumentStatus::Completed, None)
            .await?;

        info!(
            document_id = %document_id,
            chunks = totals.chunk_count,
            entities = totals.entity_count,
            relationships = totals.relationship_count,
            "document processing completed"
        );
        Ok(RunSummary {
            document_id: document_id.to_string(),
            status: DocumentStatus::Completed,
            chunk_count: totals.chunk_count,
            entity_count: totals.entity_count,
            relationship_count: totals.relationship_count,
            error: None,
        })
    }

    /// Best effort: a missing summary never fails an otherwise good run.
    async fn write_summary(
        &self,
        document_id: &str,
        pages: &[ingest::Page],
        client: &dyn ChatClient,
    ) {
        let text: String = pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n");
        let excerpt = truncate(&text, SUMMARY_INPUT_CHARS);
        if excerpt.trim().is_empty() {
            return;
        }

        let user = extract::prompt::summary_prompt(&excerpt);
        match client.invoke("You write short, factual document summaries.", &user).await {
            Ok(summary) => {
                if let Err(e) = self.document_store.set_summary(document_id, summary.trim()).await {
                    warn!(document_id = %document_id, error = %e, "failed to persist summary");
                }
            }
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "summary generation failed");
            }
        }
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
