//! Test doubles shared by the CLI and HTTP tests.

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use factbank_core::llm::box_provider::BoxLlmProvider;
use factbank_core::llm::provider::{CompletionSettings, LlmProvider};
use factbank_core::memory::box_embedder::BoxEmbedder;
use factbank_core::memory::box_store::BoxSimilarityStore;
use factbank_core::memory::decider::LlmMergeDecider;
use factbank_core::memory::embedder::Embedder;
use factbank_core::memory::engine::{EngineSettings, MemoryEngine};
use factbank_core::memory::extractor::LlmFactExtractor;
use factbank_infra::vector::in_memory::InMemorySimilarityStore;
use factbank_types::config::FactbankConfig;
use factbank_types::error::RepositoryError;
use factbank_types::llm::{CompletionRequest, CompletionResponse, LlmError, StopReason, Usage};

use crate::state::AppState;

pub const DIM: usize = 8;

/// Replies with queued contents in call order; errors once the queue is empty.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        }
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        let next = self.replies.lock().unwrap().pop_front();
        async move {
            let content = next.ok_or_else(|| LlmError::Provider {
                message: "no scripted reply left".to_string(),
            })?;
            Ok(CompletionResponse {
                id: "resp".to_string(),
                content,
                model: "scripted".to_string(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }
    }
}

/// Deterministic bag-of-bytes embedder: equal texts give equal vectors.
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, RepositoryError>> + Send {
        let vectors = texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIM];
                for (i, b) in text.bytes().enumerate() {
                    v[(i + b as usize) % DIM] += 1.0;
                }
                v
            })
            .collect();
        async move { Ok(vectors) }
    }

    fn model_name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// App state over an in-memory store with scripted LLM replies.
pub fn state_with_replies(replies: &[&str]) -> AppState {
    let provider = Arc::new(BoxLlmProvider::new(ScriptedProvider::new(replies)));
    let engine = MemoryEngine::new(
        BoxSimilarityStore::new(InMemorySimilarityStore::new()),
        BoxEmbedder::new(HashEmbedder),
        LlmFactExtractor::new(provider.clone(), CompletionSettings::default()),
        LlmMergeDecider::new(provider, CompletionSettings::default()),
        EngineSettings::default(),
    );
    AppState::from_parts(engine, FactbankConfig::default(), PathBuf::from("/tmp/factbank-test"))
}
