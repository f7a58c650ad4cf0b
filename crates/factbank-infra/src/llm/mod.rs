//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`] trait
//! defined in `factbank-core` and a factory ([`create_provider`]) that builds
//! the right provider from an [`LlmConfig`].
//!
//! [`LlmProvider`]: factbank_core::llm::provider::LlmProvider

pub mod openai_compat;

use secrecy::SecretString;

use factbank_core::llm::box_provider::BoxLlmProvider;
use factbank_types::config::{LlmConfig, LlmProviderKind};
use factbank_types::llm::LlmError;

use self::openai_compat::{config, OpenAiCompatibleProvider};

/// Create a [`BoxLlmProvider`] from an [`LlmConfig`].
///
/// `api_key` is the already-resolved secret (see
/// [`crate::config::resolve_api_key`]). OpenAI and custom endpoints require
/// one; Ollama does not.
///
/// # Errors
///
/// `AuthenticationFailed` if a required key is missing, `InvalidRequest` if a
/// custom provider has no `base_url`.
pub fn create_provider(
    config: &LlmConfig,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let provider = match config.provider {
        LlmProviderKind::OpenAi => {
            let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
            let mut oai = config::openai_defaults(key, &config.model);
            if let Some(base_url) = &config.base_url {
                oai.base_url = base_url.trim_end_matches('/').to_string();
            }
            OpenAiCompatibleProvider::new(oai)
        }
        LlmProviderKind::Ollama => {
            let mut oai = config::ollama_defaults(&config.model);
            if let Some(base_url) = &config.base_url {
                oai.base_url = base_url.trim_end_matches('/').to_string();
            }
            if let Some(key) = api_key {
                oai.api_key = key;
            }
            OpenAiCompatibleProvider::new(oai)
        }
        LlmProviderKind::Custom => {
            let base_url = config.base_url.as_deref().ok_or_else(|| {
                LlmError::InvalidRequest("custom LLM provider requires llm.base_url".to_string())
            })?;
            let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
            OpenAiCompatibleProvider::new(config::custom(base_url, key, &config.model))
        }
    };

    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        "Created LLM provider"
    );
    Ok(BoxLlmProvider::new(provider))
}
