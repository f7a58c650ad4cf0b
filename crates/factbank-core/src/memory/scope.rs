//! Call-scoped reconciliation state.
//!
//! A `ReconcileScope` lives for exactly one `MemoryEngine::add` call. It holds
//! the candidate set (whose positions are the temporary identifiers shown to
//! the decision service) and the embedding cache. Dropping it discards both,
//! so temporary ids can never leak into another call.

use std::collections::HashMap;

use factbank_types::memory::{MemoryId, MemoryRecord};
use factbank_types::reconcile::{CandidateMemory, DecisionRequest, UnresolvedReference};

#[derive(Debug, Default)]
pub struct ReconcileScope {
    /// Candidate set in aggregation order. Index == temporary id.
    candidates: Vec<MemoryRecord>,
    embeddings: HashMap<String, Vec<f32>>,
}

impl ReconcileScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fact's search results, in rank order.
    ///
    /// Records already present are appended again and receive a new
    /// temporary id.
    pub fn push_candidates(&mut self, records: impl IntoIterator<Item = MemoryRecord>) {
        self.candidates.extend(records);
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Remember the embedding computed for `text`.
    pub fn cache_embedding(&mut self, text: impl Into<String>, embedding: Vec<f32>) {
        self.embeddings.insert(text.into(), embedding);
    }

    /// Embedding previously computed for exactly this text, if any.
    pub fn cached_embedding(&self, text: &str) -> Option<&[f32]> {
        self.embeddings.get(text).map(Vec::as_slice)
    }

    /// Resolve a temporary id to the candidate it was issued for.
    pub fn resolve(&self, reference: Option<i64>) -> Result<&MemoryRecord, UnresolvedReference> {
        let reference = reference.ok_or(UnresolvedReference::Missing)?;
        usize::try_from(reference)
            .ok()
            .and_then(|index| self.candidates.get(index))
            .ok_or(UnresolvedReference::Temporary(reference))
    }

    /// The `{temporary id -> persisted id}` map, in temporary-id order.
    pub fn temporary_ids(&self) -> Vec<(u32, &MemoryId)> {
        self.candidates
            .iter()
            .enumerate()
            .map(|(index, record)| (index as u32, &record.id))
            .collect()
    }

    /// Build the decision request, exposing candidates only under their
    /// temporary ids.
    pub fn decision_request(&self, facts: &[String]) -> DecisionRequest {
        DecisionRequest {
            new_facts: facts.to_vec(),
            old_memory: self
                .candidates
                .iter()
                .enumerate()
                .map(|(index, record)| CandidateMemory {
                    id: index as u32,
                    content: record.content.clone(),
                    metadata: record.metadata.clone(),
                })
                .collect(),
        }
    }
}
