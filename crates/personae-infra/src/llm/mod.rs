//! LLM provider implementations.
//!
//! Every supported backend speaks the OpenAI chat completions protocol, so
//! one [`OpenAiCompatibleProvider`] covers them all. [`create_provider`]
//! builds it from the `[llm]` config section, and
//! [`test_provider_connection`] sends a minimal request to verify it.

pub mod openai_compat;

use personae_core::llm::box_provider::BoxLlmProvider;
use personae_types::config::LlmConfig;
use personae_types::llm::{CompletionRequest, LlmError, Message, ProviderType};

use self::openai_compat::OpenAiCompatibleProvider;

/// Create a [`BoxLlmProvider`] from the `[llm]` config section.
///
/// Hosted providers require an API key. A self-hosted OpenAI-compatible
/// server may run without one.
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] if a hosted provider has no key.
pub fn create_provider(config: &LlmConfig, api_key: Option<&str>) -> Result<BoxLlmProvider, LlmError> {
    let key = match (config.provider.clone(), api_key) {
        (_, Some(key)) => key,
        (ProviderType::OpenAiCompatible, None) => "",
        (_, None) => return Err(LlmError::AuthenticationFailed),
    };
    let compat = openai_compat::config::from_llm_config(config, key);
    tracing::debug!(
        provider = %compat.provider_name,
        base_url = %compat.base_url,
        "creating generation provider"
    );
    Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(compat)))
}

/// Test provider connectivity by sending a minimal completion request.
///
/// Sends a tiny "Hello" message to the light model with a minimal token budget.
pub async fn test_provider_connection(provider: &BoxLlmProvider, config: &LlmConfig) -> Result<(), LlmError> {
    let request = CompletionRequest {
        model: config.light_model.clone(),
        messages: vec![Message::user("Hello")],
        system: None,
        max_tokens: 10,
        temperature: Some(0.0),
        stream: false,
    };
    provider.complete(&request).await?;
    Ok(())
}
