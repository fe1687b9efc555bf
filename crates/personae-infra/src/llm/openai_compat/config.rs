//! Configuration and per-provider defaults for OpenAI-compatible providers.
//!
//! Mistral and OpenAI both speak the chat completions protocol. Each gets a
//! factory returning an [`OpenAiCompatConfig`] with its base URL and limits.

use std::time::Duration;

use personae_types::config::LlmConfig;
use personae_types::llm::{ProviderCapabilities, ProviderType};

/// Configuration for an OpenAI-compatible LLM provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "mistral", "openai").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.mistral.ai/v1").
    pub base_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model used when a request leaves `model` empty.
    pub model: String,
    /// Upper bound on a completion call or on opening a stream.
    pub request_timeout: Duration,
    pub capabilities: ProviderCapabilities,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Mistral AI default configuration.
///
/// Base URL: `https://api.mistral.ai/v1`. 32K context, 8K output.
pub fn mistral_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "mistral".into(),
        base_url: "https://api.mistral.ai/v1".into(),
        api_key: api_key.into(),
        model: model.into(),
        request_timeout: DEFAULT_TIMEOUT,
        capabilities: ProviderCapabilities {
            streaming: true,
            max_context_tokens: 32_000,
            max_output_tokens: 8_192,
        },
    }
}

/// OpenAI default configuration.
///
/// Base URL: `https://api.openai.com/v1`. 128K context, 16K output.
pub fn openai_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key: api_key.into(),
        model: model.into(),
        request_timeout: DEFAULT_TIMEOUT,
        capabilities: ProviderCapabilities {
            streaming: true,
            max_context_tokens: 128_000,
            max_output_tokens: 16_384,
        },
    }
}

/// Build a provider configuration from the `[llm]` section.
///
/// The provider type picks the defaults; `base_url` and the timeout from the
/// config file always win. Requests name their own model, so the capable
/// model is only the fallback.
pub fn from_llm_config(config: &LlmConfig, api_key: &str) -> OpenAiCompatConfig {
    let mut compat = match config.provider {
        ProviderType::Mistral => mistral_defaults(api_key, &config.capable_model),
        ProviderType::OpenAi => openai_defaults(api_key, &config.capable_model),
        ProviderType::OpenAiCompatible => OpenAiCompatConfig {
            provider_name: "openai_compatible".into(),
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            model: config.capable_model.clone(),
            request_timeout: DEFAULT_TIMEOUT,
            capabilities: ProviderCapabilities {
                streaming: true,
                max_context_tokens: 32_000,
                max_output_tokens: 4_096,
            },
        },
    };
    compat.base_url = config.base_url.clone();
    compat.request_timeout = Duration::from_secs(config.request_timeout_secs.max(1));
    compat
}
