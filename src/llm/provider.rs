use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::config::LLMConfig;
use crate::llm::openai::OpenAIAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// A chat-completion backend.
///
/// `signal` is the abort signal: when it fires the in-flight request is
/// dropped and the call resolves to [`AppError::Aborted`].
#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(
        &self,
        request: &LLMRequest,
        signal: Option<&CancellationToken>,
    ) -> AppResult<LLMResponse>;
}

/// Configuration for an LLM provider
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl From<&LLMConfig> for LLMProviderConfig {
    fn from(config: &LLMConfig) -> Self {
        Self {
            name: config.provider.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
        }
    }
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider_name: String,
}

impl LLM {
    pub fn new(provider: LLMProviderConfig) -> AppResult<Self> {
        // Every supported provider speaks the OpenAI chat-completions dialect;
        // they only differ in where the endpoint lives.
        let base_url = match (provider.base_url.as_deref(), provider.name.as_str()) {
            (Some(url), _) => url.to_string(),
            (None, "openai") => OPENAI_API_BASE.to_string(),
            (None, "openrouter") => OPENROUTER_API_BASE.to_string(),
            (None, "groq") => GROQ_API_BASE.to_string(),
            (None, other) => {
                return Err(AppError::Config(format!(
                    "Unsupported provider '{}' (set LLM_BASE_URL for custom endpoints)",
                    other
                )))
            }
        };

        let adapter: Box<dyn LLMAdapter> =
            Box::new(OpenAIAdapter::new(provider.api_key, base_url));

        Ok(Self {
            adapter,
            provider_name: provider.name,
        })
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

#[async_trait]
impl LLMAdapter for LLM {
    async fn create_chat_completion(
        &self,
        request: &LLMRequest,
        signal: Option<&CancellationToken>,
    ) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request, signal).await
    }
}
