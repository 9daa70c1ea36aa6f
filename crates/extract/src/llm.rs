use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// One synchronous request/response call against a language model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn invoke(&self, system: &str, user: &str) -> Result<String, ExtractError>;
}

/// Client for OpenAI-compatible chat-completion endpoints. Covers the
/// Moonshot API and local servers (LM Studio and friends) that speak the
/// same protocol.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize, Default)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: String, api_key: String, model: String, temperature: f32) -> Self {
        Self {
            base_url,
            api_key,
            model,
            temperature,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn invoke(&self, system: &str, user: &str) -> Result<String, ExtractError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "chat request failed: {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(content)
    }
}

/// Client for the Anthropic messages endpoint, used for synchronous calls
/// (document summaries) on the Claude provider; its extraction traffic
/// goes through the batch client instead.
#[derive(Clone)]
pub struct AnthropicChatClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize, Default)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

impl AnthropicChatClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            max_tokens: 2048,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
    async fn invoke(&self, system: &str, user: &str) -> Result<String, ExtractError> {
        let url = format!("{}/v1/messages", self.base_url);

        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExtractError::Provider(format!(
                "messages request failed: {}",
                response.status()
            )));
        }

        let parsed: AnthropicResponse = response.json().await?;
        let content = parsed
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default();

        Ok(content)
    }
}
