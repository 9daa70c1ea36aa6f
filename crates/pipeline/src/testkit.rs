use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use extract::{ChatClient, ExtractError, ExtractionStrategy, ProviderKind};
use graph::{DocumentRecord, DocumentStore, MemoryStore};
use ingest::PlainTextExtractor;

use crate::config::{ChunkingConfig, PipelineConfig};
use crate::orchestrator::{PipelineOrchestrator, ProcessRequest, ProviderFactory};

/// Chat client that pops canned responses; once the script runs out every
/// call fails with a transport error.
pub(crate) struct ScriptedChat {
    responses: Mutex<Vec<Result<String, ExtractError>>>,
    delay: Duration,
}

impl ScriptedChat {
    pub(crate) fn new(responses: Vec<Result<String, ExtractError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn always_failing() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn invoke(&self, _system: &str, _user: &str) -> Result<String, ExtractError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(ExtractError::Provider("connection refused".to_string()))
        } else {
            responses.remove(0)
        }
    }
}

/// Runs everything through one sequential scripted client, no summaries.
pub(crate) struct ScriptedFactory {
    client: Arc<dyn ChatClient>,
}

impl ScriptedFactory {
    pub(crate) fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }
}

impl ProviderFactory for ScriptedFactory {
    fn strategy(&self, _kind: ProviderKind) -> ExtractionStrategy {
        ExtractionStrategy::Sequential {
            client: self.client.clone(),
        }
    }

    fn summary_client(&self, _kind: ProviderKind) -> Option<Arc<dyn ChatClient>> {
        None
    }
}

pub(crate) fn single_entity_json(id: &str) -> String {
    format!(r#"{{"nodes":[{{"id":"{id}","type":"Concept"}}],"relationships":[]}}"#)
}

/// Word-window config sized so a 25-word document makes exactly 5 chunks.
pub(crate) fn small_chunk_config() -> PipelineConfig {
    PipelineConfig {
        chunking: ChunkingConfig {
            token_chunk_size: 5,
            chunk_overlap: 0,
            max_token_chunk_size: 10_000,
        },
        ..PipelineConfig::default()
    }
}

pub(crate) async fn write_temp_doc(words: usize) -> PathBuf {
    let text = (0..words)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ");
    let path = std::env::temp_dir().join(format!("pipeline-test-{}.txt", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, text).await.expect("write temp doc");
    path
}

pub(crate) async fn registered_store(document_id: &str, file_path: &PathBuf) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .register_document(&DocumentRecord::new(
            document_id,
            file_path.display().to_string(),
            "Text File",
        ))
        .await
        .expect("register document");
    store
}

pub(crate) fn orchestrator(
    store: Arc<MemoryStore>,
    factory: ScriptedFactory,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        small_chunk_config(),
        store.clone(),
        store,
        vec![Box::new(PlainTextExtractor)],
        Box::new(factory),
        None,
    )
}

pub(crate) fn request(document_id: &str, file_path: PathBuf) -> ProcessRequest {
    ProcessRequest {
        document_id: document_id.to_string(),
        file_path,
        provider: "deepseek".to_string(),
        extraction_prompt: None,
    }
}
