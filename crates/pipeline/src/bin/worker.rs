use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use extract::ProviderSettings;
use graph::{DocumentRecord, DocumentStore, Neo4jStore, OpenAiEmbeddingClient};
use ingest::{PlainTextExtractor, TextExtractor};
use pipeline::{
    EnvProviderFactory, PipelineConfig, PipelineOrchestrator, ProcessRequest, ProcessingQueue,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = PipelineConfig::from_env();
    let settings = ProviderSettings::from_env();

    let store = Arc::new(
        Neo4jStore::connect(&config.neo4j.uri, &config.neo4j.user, &config.neo4j.password)
            .await
            .context("Failed to connect to Neo4j")?,
    );

    let embeddings = if settings.openai_api_key.is_empty() {
        None
    } else {
        Some(Arc::new(OpenAiEmbeddingClient::new(
            settings.openai_base_url.clone(),
            settings.openai_api_key.clone(),
        )) as Arc<dyn graph::EmbeddingProvider>)
    };

    let extractor = PlainTextExtractor;
    let provider = config.default_model.clone();

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        config,
        store.clone(),
        store.clone(),
        vec![Box::new(PlainTextExtractor)],
        Box::new(EnvProviderFactory::new(settings)),
        embeddings,
    ));
    let queue = ProcessingQueue::new(orchestrator);

    let files: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if files.is_empty() {
        anyhow::bail!("Usage: worker <file> [<file> ...]");
    }

    for path in files {
        let document_id = uuid::Uuid::new_v4().to_string();
        store
            .register_document(&DocumentRecord::new(
                document_id.clone(),
                path.display().to_string(),
                extractor.file_type(&path),
            ))
            .await?;

        info!(document_id = %document_id, path = %path.display(), "enqueueing document");
        queue.enqueue(ProcessRequest {
            document_id,
            file_path: path,
            provider: provider.clone(),
            extraction_prompt: None,
        });
    }

    while queue.active_count() > 0 {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    info!("all documents processed");
    Ok(())
}
