//! Merge decision.
//!
//! `MergeDecider` turns new facts plus the retrieved candidates into an ordered
//! list of merge actions. Candidates are addressed by temporary integer ids;
//! the decider never sees persisted identifiers.

use std::sync::Arc;

use factbank_types::llm::{CompletionRequest, LlmError, Message, MessageRole};
use factbank_types::reconcile::{DecisionRequest, DecisionResponse};
use factbank_types::schema::output_config_for;

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::CompletionSettings;
use crate::llm::structured::parse_structured;

/// Trait for the decision service.
pub trait MergeDecider: Send + Sync {
    fn decide(
        &self,
        request: &DecisionRequest,
    ) -> impl std::future::Future<Output = Result<DecisionResponse, LlmError>> + Send;
}

/// System prompt for the merge decision LLM call.
const DECISION_SYSTEM_PROMPT: &str = r#"You are a memory manager. You receive new facts and a list of existing memories, and decide how the memory bank should change.

Each existing memory has an integer "id". Use ONLY those ids as references; never invent one.

For every new fact choose one action:
- "ADD": the fact is new information not covered by any existing memory. "text" is the fact. "reference" may be omitted.
- "UPDATE": the fact refines or corrects an existing memory. "reference" is that memory's id, "text" is the full replacement content.
- "DELETE": the fact contradicts an existing memory that should be removed. "reference" is that memory's id.
- "NONE": the fact is already captured. Nothing changes.

Rules:
1. Prefer UPDATE over ADD when a memory is about the same subject
2. Do not produce two actions for the same fact
3. Keep texts short and self-contained
4. Return actions in the order they should be applied

Return a JSON object: {"actions": [{"reference": <integer or null>, "text": <string>, "action": "ADD" | "UPDATE" | "DELETE" | "NONE"}]}

Example:
Input: {"newFacts": ["lives in Paris"], "oldMemory": [{"id": 0, "content": "lives in Berlin", "metadata": {}}]}
Output: {"actions": [{"reference": 0, "text": "lives in Paris", "action": "UPDATE"}]}"#;

/// LLM-backed [`MergeDecider`].
///
/// The decision request is serialized verbatim as the user message.
pub struct LlmMergeDecider {
    provider: Arc<BoxLlmProvider>,
    settings: CompletionSettings,
}

impl LlmMergeDecider {
    pub fn new(provider: Arc<BoxLlmProvider>, settings: CompletionSettings) -> Self {
        Self { provider, settings }
    }

    fn build_request(&self, request: &DecisionRequest) -> Result<CompletionRequest, LlmError> {
        let payload = serde_json::to_string(request)
            .map_err(|e| LlmError::InvalidRequest(format!("unserializable decision request: {e}")))?;

        Ok(CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![Message {
                role: MessageRole::User,
                content: payload,
            }],
            system: Some(DECISION_SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: Some(self.settings.temperature),
            output_config: Some(output_config_for::<DecisionResponse>("decision_response")),
        })
    }
}

impl MergeDecider for LlmMergeDecider {
    #[tracing::instrument(
        name = "decide_actions",
        skip(self, request),
        fields(
            provider = %self.provider.name(),
            fact_count = request.new_facts.len(),
            candidate_count = request.old_memory.len(),
        )
    )]
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionResponse, LlmError> {
        let completion = self.build_request(request)?;
        let response = self.provider.complete(&completion).await?;
        let parsed: DecisionResponse = parse_structured(&response.content)?;

        tracing::debug!(action_count = parsed.actions.len(), "Decided merge actions");
        Ok(parsed)
    }
}
