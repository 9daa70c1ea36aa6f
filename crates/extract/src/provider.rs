use std::env;
use std::sync::Arc;

use crate::batch_api::{AnthropicBatchClient, OpenAiBatchClient};
use crate::job::BatchJobManager;
use crate::llm::{AnthropicChatClient, ChatClient, OpenAiCompatClient};

/// The interchangeable language-model backends. Selection happens once per
/// run, from the request's provider name; there is no global default client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Claude,
    OpenAi,
    Kimi,
    DeepSeek,
}

pub const SUPPORTED_PROVIDERS: &[&str] = &["claude", "openai", "kimi", "deepseek"];

impl ProviderKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "openai" => Some(Self::OpenAi),
            "kimi" => Some(Self::Kimi),
            "deepseek" => Some(Self::DeepSeek),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::OpenAi => "openai",
            Self::Kimi => "kimi",
            Self::DeepSeek => "deepseek",
        }
    }
}

/// Connection settings for every backend, read once from the environment.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub moonshot_api_key: String,
    pub moonshot_base_url: String,
    pub lm_studio_url: String,
    pub lm_studio_model: String,
}

impl ProviderSettings {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            anthropic_base_url: env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            moonshot_api_key: env::var("MOONSHOT_API_KEY").unwrap_or_default(),
            moonshot_base_url: env::var("MOONSHOT_BASE_URL")
                .unwrap_or_else(|_| "https://api.moonshot.ai/v1".to_string()),
            lm_studio_url: env::var("LM_STUDIO_URL")
                .unwrap_or_else(|_| "http://localhost:1234/v1".to_string()),
            lm_studio_model: env::var("LM_STUDIO_MODEL")
                .unwrap_or_else(|_| "deepseek-r1-0528-qwen3-8b".to_string()),
        }
    }
}

/// Execution capability chosen for a run: one remote batch job, a bounded
/// worker pool, or strictly sequential per-chunk calls.
pub enum ExtractionStrategy {
    Batch(BatchJobManager),
    BoundedConcurrency {
        client: Arc<dyn ChatClient>,
        max_in_flight: usize,
    },
    Sequential {
        client: Arc<dyn ChatClient>,
    },
}

impl ProviderKind {
    pub fn strategy(&self, settings: &ProviderSettings) -> ExtractionStrategy {
        match self {
            Self::Claude => ExtractionStrategy::Batch(BatchJobManager::new(Box::new(
                AnthropicBatchClient::new(
                    settings.anthropic_base_url.clone(),
                    settings.anthropic_api_key.clone(),
                    "claude-haiku-4-5".to_string(),
                ),
            ))),
            Self::OpenAi => ExtractionStrategy::Batch(BatchJobManager::new(Box::new(
                OpenAiBatchClient::new(
                    settings.openai_base_url.clone(),
                    settings.openai_api_key.clone(),
                    "gpt-4o-mini".to_string(),
                ),
            ))),
            Self::Kimi => ExtractionStrategy::BoundedConcurrency {
                client: Arc::new(OpenAiCompatClient::new(
                    settings.moonshot_base_url.clone(),
                    settings.moonshot_api_key.clone(),
                    "kimi-k2-thinking-turbo".to_string(),
                    0.0,
                )),
                max_in_flight: 3,
            },
            Self::DeepSeek => ExtractionStrategy::Sequential {
                client: Arc::new(OpenAiCompatClient::new(
                    settings.lm_studio_url.clone(),
                    // Local server, no key required.
                    String::new(),
                    settings.lm_studio_model.clone(),
                    0.0,
                )),
            },
        }
    }

    /// Synchronous chat client for auxiliary calls (document summaries),
    /// even on providers whose extraction path is batch-only.
    pub fn chat_client(&self, settings: &ProviderSettings) -> Arc<dyn ChatClient> {
        match self {
            Self::Claude => Arc::new(AnthropicChatClient::new(
                settings.anthropic_base_url.clone(),
                settings.anthropic_api_key.clone(),
                "claude-haiku-4-5".to_string(),
            )),
            Self::OpenAi => Arc::new(OpenAiCompatClient::new(
                format!("{}/v1", settings.openai_base_url),
                settings.openai_api_key.clone(),
                "gpt-4o-mini".to_string(),
                0.0,
            )),
            Self::Kimi => Arc::new(OpenAiCompatClient::new(
                settings.moonshot_base_url.clone(),
                settings.moonshot_api_key.clone(),
                "kimi-k2-thinking-turbo".to_string(),
                0.3,
            )),
            Self::DeepSeek => Arc::new(OpenAiCompatClient::new(
                settings.lm_studio_url.clone(),
                String::new(),
                settings.lm_studio_model.clone(),
                0.0,
            )),
        }
    }
}
