//! LlmProvider trait definition.
//!
//! This is the core abstraction that reasoning backends implement. The
//! extraction and decision services are built on top of it.

use factbank_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends (OpenAI, Ollama, any compatible endpoint).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in factbank-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}

/// Per-request generation settings shared by the reasoning services.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    /// Model identifier; empty means the provider's default.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 2048,
            temperature: 0.0,
        }
    }
}

impl From<&factbank_types::config::LlmConfig> for CompletionSettings {
    fn from(config: &factbank_types::config::LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}
