use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::error::ExtractError;

/// Remote lifecycle of a submitted batch job, normalized across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteBatchState {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Expired,
    Failed,
}

impl RemoteBatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::InProgress => "in_progress",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

/// One chunk's request inside a batch job.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub custom_id: String,
    pub system: String,
    pub user: String,
}

/// One chunk's raw result: the response body text, or the remote error.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub custom_id: String,
    pub body: Result<String, String>,
}

/// Batch-capable language-model backend: submit many requests under one
/// remote job, poll it, and read per-request results once terminal.
#[async_trait]
pub trait BatchClient: Send + Sync {
    /// Whether historic job state can be queried for crash recovery.
    fn supports_recovery(&self) -> bool {
        true
    }

    /// Longest acceptable wait for this backend's completion SLA.
    fn max_wait(&self) -> Duration;

    async fn submit(&self, requests: &[BatchRequest]) -> Result<String, ExtractError>;

    async fn status(&self, job_id: &str) -> Result<RemoteBatchState, ExtractError>;

    async fn results(&self, job_id: &str) -> Result<Vec<BatchEntry>, ExtractError>;
}

// ---------------------------------------------------------------------------
// Anthropic message batches (~1h SLA)
// ---------------------------------------------------------------------------

pub struct AnthropicBatchClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct AnthropicBatch {
    id: String,
    processing_status: String,
}

impl AnthropicBatchClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
    }

    fn map_state(status: &str) -> RemoteBatchState {
        match status {
            "in_progress" | "canceling" => RemoteBatchState::InProgress,
            "ended" => RemoteBatchState::Completed,
            _ => RemoteBatchState::Validating,
        }
    }
}

#[async_trait]
impl BatchClient for AnthropicBatchClient {
    fn max_wait(&self) -> Duration {
        Duration::from_secs(3600)
    }

    async fn submit(&self, requests: &[BatchRequest]) -> Result<String, ExtractError> {
        let url = format!("{}/v1/messages/batches", self.base_url);

        let body = json!({
            "requests": requests.iter().map(|r| json!({
                "custom_id": r.custom_id,
                "params": {
                    "model": self.model,
                    "max_tokens": 2048,
                    "system": r.system,
                    "messages": [{"role": "user", "content": r.user}],
                }
            })).collect::<Vec<_>>()
        });

        let response = self.auth(self.client.post(&url)).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "batch create failed: {}",
                response.status()
            )));
        }

        let batch: AnthropicBatch = response.json().await?;
        Ok(batch.id)
    }

    async fn status(&self, job_id: &str) -> Result<RemoteBatchState, ExtractError> {
        let url = format!("{}/v1/messages/batches/{}", self.base_url, job_id);

        let response = self.auth(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "batch retrieve failed: {}",
                response.status()
            )));
        }

        let batch: AnthropicBatch = response.json().await?;
        Ok(Self::map_state(&batch.processing_status))
    }

    async fn results(&self, job_id: &str) -> Result<Vec<BatchEntry>, ExtractError> {
        let url = format!("{}/v1/messages/batches/{}/results", self.base_url, job_id);

        let response = self.auth(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "batch results failed: {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        let mut entries = Vec::new();

        // One JSON object per line; skip lines that do not parse rather
        // than failing the whole batch.
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            let custom_id = value["custom_id"].as_str().unwrap_or("unknown").to_string();
            let result = &value["result"];

            let body = if result["type"].as_str() == Some("succeeded") {
                Ok(result["message"]["content"][0]["text"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string())
            } else {
                Err(result["error"]["message"]
                    .as_str()
                    .unwrap_or("request did not succeed")
                    .to_string())
            };

            entries.push(BatchEntry { custom_id, body });
        }

        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// OpenAI batches: JSONL file upload, ~24h completion window
// ---------------------------------------------------------------------------

pub struct OpenAiBatchClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct OpenAiFile {
    id: String,
}

#[derive(Deserialize)]
struct OpenAiBatch {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
}

#[derive(Serialize)]
struct OpenAiBatchCreate<'a> {
    input_file_id: &'a str,
    endpoint: &'a str,
    completion_window: &'a str,
}

impl OpenAiBatchClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn map_state(status: &str) -> RemoteBatchState {
        match status {
            "validating" => RemoteBatchState::Validating,
            "in_progress" => RemoteBatchState::InProgress,
            "finalizing" => RemoteBatchState::Finalizing,
            "completed" => RemoteBatchState::Completed,
            "expired" => RemoteBatchState::Expired,
            _ => RemoteBatchState::Failed,
        }
    }

    fn build_jsonl(&self, requests: &[BatchRequest]) -> String {
        let mut jsonl = String::new();
        for request in requests {
            let line = json!({
                "custom_id": request.custom_id,
                "method": "POST",
                "url": "/v1/chat/completions",
                "body": {
                    "model": self.model,
                    "messages": [
                        {"role": "system", "content": request.system},
                        {"role": "user", "content": request.user},
                    ],
                    "temperature": 0,
                }
            });
            jsonl.push_str(&line.to_string());
            jsonl.push('\n');
        }
        jsonl
    }

    async fn retrieve(&self, job_id: &str) -> Result<OpenAiBatch, ExtractError> {
        let url = format!("{}/v1/batches/{}", self.base_url, job_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "batch retrieve failed: {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl BatchClient for OpenAiBatchClient {
    fn max_wait(&self) -> Duration {
        Duration::from_secs(86_400)
    }

    async fn submit(&self, requests: &[BatchRequest]) -> Result<String, ExtractError> {
        // Upload the JSONL input file first.
        let jsonl = self.build_jsonl(requests);
        let part = reqwest::multipart::Part::text(jsonl).file_name("batch_input.jsonl");
        let form = reqwest::multipart::Form::new()
            .text("purpose", "batch")
            .part("file", part);

        let url = format!("{}/v1/files", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "batch file upload failed: {}",
                response.status()
            )));
        }
        let file: OpenAiFile = response.json().await?;

        let url = format!("{}/v1/batches", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&OpenAiBatchCreate {
                input_file_id: &file.id,
                endpoint: "/v1/chat/completions",
                completion_window: "24h",
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "batch create failed: {}",
                response.status()
            )));
        }

        let batch: OpenAiBatch = response.json().await?;
        Ok(batch.id)
    }

    async fn status(&self, job_id: &str) -> Result<RemoteBatchState, ExtractError> {
        let batch = self.retrieve(job_id).await?;
        Ok(Self::map_state(&batch.status))
    }

    async fn results(&self, job_id: &str) -> Result<Vec<BatchEntry>, ExtractError> {
        let batch = self.retrieve(job_id).await?;
        let Some(output_file_id) = batch.output_file_id else {
            return Ok(Vec::new());
        };

        let url = format!("{}/v1/files/{}/content", self.base_url, output_file_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "batch output download failed: {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        let mut entries = Vec::new();

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            let custom_id = value["custom_id"].as_str().unwrap_or("unknown").to_string();
            let response = &value["response"];

            let body = if response["status_code"].as_i64() == Some(200) {
                Ok(response["body"]["choices"][0]["message"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string())
            } else {
                Err(format!(
                    "HTTP {}",
                    response["status_code"].as_i64().unwrap_or(0)
                ))
            };

            entries.push(BatchEntry { custom_id, body });
        }

        Ok(entries)
    }
}
