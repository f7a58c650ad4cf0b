//! Fact extraction.
//!
//! `FactExtractor` maps raw input text to an ordered list of atomic facts.
//! `LlmFactExtractor` implements it with one schema-constrained LLM call.
//!
//! Unlike best-effort extraction elsewhere, a malformed response is an error:
//! the engine must not guess at facts it will later mutate the store with.

use std::sync::Arc;

use factbank_types::llm::{CompletionRequest, LlmError, Message, MessageRole};
use factbank_types::reconcile::{ExtractionRequest, ExtractionResponse};
use factbank_types::schema::output_config_for;

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::CompletionSettings;
use crate::llm::structured::parse_structured;

/// Trait for the extraction service.
///
/// Output is non-deterministic across calls; callers treat it as opaque input
/// beyond structural conformance. An empty fact list is valid.
pub trait FactExtractor: Send + Sync {
    fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> impl std::future::Future<Output = Result<ExtractionResponse, LlmError>> + Send;
}

/// System prompt for the fact extraction LLM call.
const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are a fact extraction assistant. Split the user's text into short, atomic factual statements worth remembering long term.

Rules:
1. Each fact must be a single, self-contained statement
2. Keep the wording close to the source; do not infer things that were not said
3. Use the third person without a subject where natural (e.g. "lives in Paris", "loves hiking")
4. Do NOT include greetings, pleasantries, questions or filler
5. Keep facts in the order they appear in the text
6. If the text contains nothing worth remembering, return an empty list

Return a JSON object with exactly one field:
- "facts": array of strings

Example:
Input: "Hi! I live in Paris and I love hiking."
Output: {"facts": ["lives in Paris", "loves hiking"]}"#;

/// LLM-backed [`FactExtractor`].
pub struct LlmFactExtractor {
    provider: Arc<BoxLlmProvider>,
    settings: CompletionSettings,
}

impl LlmFactExtractor {
    pub fn new(provider: Arc<BoxLlmProvider>, settings: CompletionSettings) -> Self {
        Self { provider, settings }
    }

    fn build_request(&self, request: &ExtractionRequest) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![Message {
                role: MessageRole::User,
                content: request.content.clone(),
            }],
            system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: Some(self.settings.temperature),
            output_config: Some(output_config_for::<ExtractionResponse>("extraction_response")),
        }
    }
}

impl FactExtractor for LlmFactExtractor {
    #[tracing::instrument(
        name = "extract_facts",
        skip(self, request),
        fields(provider = %self.provider.name(), content_len = request.content.len())
    )]
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, LlmError> {
        if request.content.trim().is_empty() {
            return Ok(ExtractionResponse { facts: Vec::new() });
        }

        let completion = self.build_request(request);
        let response = self.provider.complete(&completion).await?;
        let parsed: ExtractionResponse = parse_structured(&response.content)?;

        tracing::debug!(fact_count = parsed.facts.len(), "Extracted facts");
        Ok(parsed)
    }
}
