//! Memory reconciliation engine.
//!
//! `MemoryEngine::add` turns one piece of input text into a bounded set of
//! store mutations:
//!
//! 1. extract facts
//! 2. embed each fact and search the store for candidates
//! 3. number the candidates with temporary ids (fact order, then rank order)
//! 4. ask the decision service for merge actions
//! 5. apply the actions sequentially
//!
//! Steps 1-4 never touch the store. A failure in step 5 stops the remaining
//! actions but does not undo the ones already applied; the error carries that
//! applied prefix (see [`ReconcileError::applied`]).
//!
//! The engine does not coordinate concurrent `add` calls. Callers that need
//! consistent results for one subject must serialize their calls.

use std::future::Future;
use std::time::Duration;

use futures_util::future::try_join_all;

use factbank_types::config::{EngineConfig, SearchConfig};
use factbank_types::error::{ReconcileError, RepositoryError, Stage};
use factbank_types::memory::{
    ListOptions, Memory, MemoryId, MemoryRecord, Metadata, NewMemory, RankedMemory, SearchOptions,
};
use factbank_types::reconcile::{
    ActionKind, AppliedAction, ExtractionRequest, MergeAction, UnresolvedReference,
};

use super::decider::MergeDecider;
use super::embedder::Embedder;
use super::extractor::FactExtractor;
use super::scope::ReconcileScope;
use super::store::SimilarityStore;

/// Tuning for a [`MemoryEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Used for candidate retrieval and for `search`.
    pub search: SearchOptions,
    /// Upper bound for each individual collaborator call.
    pub collaborator_timeout: Duration,
    /// Embed and search facts concurrently. Aggregation order is unaffected.
    pub concurrent_retrieval: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default(), &EngineConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(search: &SearchConfig, engine: &EngineConfig) -> Self {
        Self {
            search: search.options(),
            collaborator_timeout: Duration::from_millis(engine.collaborator_timeout_ms),
            concurrent_retrieval: engine.concurrent_retrieval,
        }
    }
}

/// Why applying a single action failed.
enum ApplyFailure {
    Reference(UnresolvedReference),
    Collaborator(ReconcileError),
}

impl ApplyFailure {
    fn into_error(self, action_index: usize, applied: Vec<AppliedAction>) -> ReconcileError {
        match self {
            ApplyFailure::Reference(reference) => ReconcileError::ReferenceNotFound {
                reference,
                action_index,
                applied,
            },
            ApplyFailure::Collaborator(source) => ReconcileError::ApplyFailed {
                action_index,
                applied,
                source: Box::new(source),
            },
        }
    }
}

impl From<ReconcileError> for ApplyFailure {
    fn from(err: ReconcileError) -> Self {
        ApplyFailure::Collaborator(err)
    }
}

/// Result of applying one action: the bookkeeping entry plus any records
/// to surface to the caller (ADD/UPDATE only).
struct ApplyOutcome {
    applied: AppliedAction,
    records: Vec<MemoryRecord>,
}

/// Orchestrates extraction, retrieval, decision and action application.
pub struct MemoryEngine<S, E, X, D>
where
    S: SimilarityStore,
    E: Embedder,
    X: FactExtractor,
    D: MergeDecider,
{
    store: S,
    embedder: E,
    extractor: X,
    decider: D,
    settings: EngineSettings,
}

impl<S, E, X, D> MemoryEngine<S, E, X, D>
where
    S: SimilarityStore,
    E: Embedder,
    X: FactExtractor,
    D: MergeDecider,
{
    pub fn new(store: S, embedder: E, extractor: X, decider: D, settings: EngineSettings) -> Self {
        Self {
            store,
            embedder,
            extractor,
            decider,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Reconcile `content` into the store.
    ///
    /// Returns the records created or updated by this call, in the order their
    /// actions were applied. DELETE and NONE produce no entries.
    #[tracing::instrument(
        name = "reconcile_add",
        skip(self, content),
        fields(
            content_len = content.len(),
            fact_count = tracing::field::Empty,
            candidate_count = tracing::field::Empty,
            action_count = tracing::field::Empty,
        )
    )]
    pub async fn add(&self, content: &str) -> Result<Vec<Memory>, ReconcileError> {
        let span = tracing::Span::current();

        let extraction = self
            .bounded(
                Stage::Extraction,
                self.extractor.extract(&ExtractionRequest {
                    content: content.to_string(),
                }),
                ReconcileError::Extraction,
            )
            .await?;
        let facts = extraction.facts;
        span.record("fact_count", facts.len());

        let mut scope = ReconcileScope::new();
        for (fact, (embedding, hits)) in facts.iter().zip(self.retrieve_all(&facts).await?) {
            scope.cache_embedding(fact.clone(), embedding);
            scope.push_candidates(hits.into_iter().map(|hit| hit.record));
        }
        span.record("candidate_count", scope.candidate_count());
        tracing::debug!(temporary_ids = ?scope.temporary_ids(), "Issued temporary ids");

        let decision = self
            .bounded(
                Stage::Decision,
                self.decider.decide(&scope.decision_request(&facts)),
                ReconcileError::Decision,
            )
            .await?;
        span.record("action_count", decision.actions.len());

        let mut applied: Vec<AppliedAction> = Vec::with_capacity(decision.actions.len());
        let mut results: Vec<Memory> = Vec::new();

        for (index, action) in decision.actions.iter().enumerate() {
            match self.apply_action(&mut scope, index, action).await {
                Ok(outcome) => {
                    tracing::debug!(
                        index,
                        kind = %outcome.applied.kind,
                        memory_id = ?outcome.applied.memory_id,
                        "Applied merge action"
                    );
                    results.extend(outcome.records.into_iter().map(Memory::from));
                    applied.push(outcome.applied);
                }
                Err(failure) => {
                    tracing::warn!(
                        index,
                        kind = %action.kind,
                        applied = applied.len(),
                        remaining = decision.actions.len() - index,
                        "Aborting action application; earlier actions remain applied"
                    );
                    return Err(failure.into_error(index, applied));
                }
            }
        }

        tracing::info!(
            facts = facts.len(),
            actions = applied.len(),
            changed = results.len(),
            "Reconciled content"
        );
        Ok(results)
    }

    /// Semantic search with the configured defaults. No reconciliation.
    pub async fn search(&self, content: &str) -> Result<Vec<RankedMemory>, ReconcileError> {
        self.search_with(content, &self.settings.search).await
    }

    /// Semantic search with explicit options. Results are closest first.
    #[tracing::instrument(
        name = "reconcile_search",
        skip(self, content),
        fields(content_len = content.len(), top_k = options.top_k)
    )]
    pub async fn search_with(
        &self,
        content: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RankedMemory>, ReconcileError> {
        let embedding = self.embed_one(content).await?;
        self.bounded(
            Stage::Search,
            self.store.search(&embedding, options),
            ReconcileError::Store,
        )
        .await
    }

    /// A page of stored memories ordered by identifier.
    #[tracing::instrument(name = "reconcile_list", skip(self), fields(limit = options.limit))]
    pub async fn list(&self, options: &ListOptions) -> Result<Vec<Memory>, ReconcileError> {
        let records = self.store.list(options).await.map_err(ReconcileError::Store)?;
        Ok(records.into_iter().map(Memory::from).collect())
    }

    pub async fn get(&self, id: &MemoryId) -> Result<Option<Memory>, ReconcileError> {
        let record = self.store.get(id).await.map_err(ReconcileError::Store)?;
        Ok(record.map(Memory::from))
    }

    /// Remove a memory directly. Idempotent.
    #[tracing::instrument(name = "reconcile_delete", skip(self), fields(memory_id = %id))]
    pub async fn delete(&self, id: &MemoryId) -> Result<(), ReconcileError> {
        self.store.delete(id).await.map_err(ReconcileError::Store)
    }

    pub async fn count(&self) -> Result<u64, ReconcileError> {
        self.store.count().await.map_err(ReconcileError::Store)
    }

    /// Embed and search every fact, returning results in fact order.
    async fn retrieve_all(
        &self,
        facts: &[String],
    ) -> Result<Vec<(Vec<f32>, Vec<RankedMemory>)>, ReconcileError> {
        if self.settings.concurrent_retrieval {
            // try_join_all yields outputs in input order regardless of completion order.
            try_join_all(facts.iter().map(|fact| self.retrieve(fact))).await
        } else {
            let mut retrieved = Vec::with_capacity(facts.len());
            for fact in facts {
                retrieved.push(self.retrieve(fact).await?);
            }
            Ok(retrieved)
        }
    }

    async fn retrieve(&self, fact: &str) -> Result<(Vec<f32>, Vec<RankedMemory>), ReconcileError> {
        let embedding = self.embed_one(fact).await?;
        let hits = self
            .bounded(
                Stage::Search,
                self.store.search(&embedding, &self.settings.search),
                ReconcileError::Store,
            )
            .await?;
        Ok((embedding, hits))
    }

    async fn apply_action(
        &self,
        scope: &mut ReconcileScope,
        index: usize,
        action: &MergeAction,
    ) -> Result<ApplyOutcome, ApplyFailure> {
        match action.kind {
            ActionKind::Add => {
                let embedding = self.resolve_embedding(scope, &action.text).await?;
                let entry = NewMemory {
                    content: action.text.clone(),
                    embedding,
                    metadata: Metadata::new(),
                };
                let records = self
                    .store
                    .add(std::slice::from_ref(&entry))
                    .await
                    .map_err(ReconcileError::Store)?;
                Ok(ApplyOutcome {
                    applied: AppliedAction {
                        index,
                        kind: ActionKind::Add,
                        memory_id: records.first().map(|r| r.id.clone()),
                    },
                    records,
                })
            }
            ActionKind::Update => {
                let target = scope
                    .resolve(action.reference)
                    .map_err(ApplyFailure::Reference)?;
                let id = target.id.clone();
                let metadata = target.metadata.clone();

                let embedding = self.resolve_embedding(scope, &action.text).await?;
                let entry = NewMemory {
                    content: action.text.clone(),
                    embedding,
                    metadata,
                };
                let record = match self.store.update(&id, &entry).await {
                    Ok(record) => record,
                    Err(RepositoryError::NotFound) => {
                        return Err(ApplyFailure::Reference(UnresolvedReference::Persisted(id)));
                    }
                    Err(e) => return Err(ReconcileError::Store(e).into()),
                };
                Ok(ApplyOutcome {
                    applied: AppliedAction {
                        index,
                        kind: ActionKind::Update,
                        memory_id: Some(id),
                    },
                    records: vec![record],
                })
            }
            ActionKind::Delete => {
                let id = scope
                    .resolve(action.reference)
                    .map_err(ApplyFailure::Reference)?
                    .id
                    .clone();
                self.store
                    .delete(&id)
                    .await
                    .map_err(ReconcileError::Store)?;
                Ok(ApplyOutcome {
                    applied: AppliedAction {
                        index,
                        kind: ActionKind::Delete,
                        memory_id: Some(id),
                    },
                    records: Vec::new(),
                })
            }
            ActionKind::Noop => Ok(ApplyOutcome {
                applied: AppliedAction {
                    index,
                    kind: ActionKind::Noop,
                    memory_id: None,
                },
                records: Vec::new(),
            }),
        }
    }

    /// Reuse the cached embedding for an exact text match, else compute one.
    async fn resolve_embedding(
        &self,
        scope: &mut ReconcileScope,
        text: &str,
    ) -> Result<Vec<f32>, ReconcileError> {
        if let Some(cached) = scope.cached_embedding(text) {
            return Ok(cached.to_vec());
        }
        let embedding = self.embed_one(text).await?;
        scope.cache_embedding(text, embedding.clone());
        Ok(embedding)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ReconcileError> {
        let mut vectors = self
            .bounded(
                Stage::Embedding,
                self.embedder.embed(&[text.to_string()]),
                ReconcileError::Embedding,
            )
            .await?;

        if vectors.len() != 1 {
            return Err(ReconcileError::Embedding(RepositoryError::Query(format!(
                "expected 1 embedding, got {}",
                vectors.len()
            ))));
        }
        let vector = vectors.swap_remove(0);
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(ReconcileError::Embedding(RepositoryError::Query(format!(
                "embedding dimension mismatch: expected {expected}, got {}",
                vector.len()
            ))));
        }
        Ok(vector)
    }

    /// Run a collaborator call under the configured timeout.
    ///
    /// Store writes in step 5 are never wrapped: a write abandoned on timeout
    /// may still commit, and the applied prefix would then be wrong.
    async fn bounded<T, Err>(
        &self,
        stage: Stage,
        call: impl Future<Output = Result<T, Err>>,
        map_err: impl FnOnce(Err) -> ReconcileError,
    ) -> Result<T, ReconcileError> {
        match tokio::time::timeout(self.settings.collaborator_timeout, call).await {
            Ok(result) => result.map_err(map_err),
            Err(_) => {
                tracing::warn!(%stage, "Collaborator call timed out");
                Err(ReconcileError::Timeout {
                    stage,
                    after_ms: self.settings.collaborator_timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use factbank_types::llm::LlmError;
    use factbank_types::reconcile::{DecisionRequest, DecisionResponse, ExtractionResponse};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const DIM: usize = 3;

    // --- Mock collaborators ---

    /// Store with scripted search results keyed by exact query embedding.
    ///
    /// Search results are snapshots and need not exist in `records`, which
    /// lets tests model records removed between retrieval and application.
    #[derive(Default)]
    struct MockStore {
        records: Mutex<BTreeMap<MemoryId, MemoryRecord>>,
        search_results: Mutex<Vec<(Vec<f32>, Vec<MemoryRecord>)>>,
        ops: Mutex<Vec<String>>,
        fail_update: Mutex<bool>,
        /// Latency after an `add` has committed, before it returns.
        add_ack_delay: Mutex<Option<Duration>>,
        next_id: AtomicUsize,
    }

    impl MockStore {
        fn insert(&self, id: &str, content: &str, embedding: Vec<f32>) -> MemoryRecord {
            let record = MemoryRecord {
                id: MemoryId::from(id),
                content: content.to_string(),
                embedding,
                metadata: Metadata::new(),
                created_at: Utc::now(),
                updated_at: None,
            };
            self.records
                .lock()
                .unwrap()
                .insert(record.id.clone(), record.clone());
            record
        }

        fn script_search(&self, query: Vec<f32>, hits: Vec<MemoryRecord>) {
            self.search_results.lock().unwrap().push((query, hits));
        }

        fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        fn record(&self, id: &str) -> Option<MemoryRecord> {
            self.records.lock().unwrap().get(&MemoryId::from(id)).cloned()
        }

        fn mutations(&self) -> Vec<String> {
            self.ops
                .lock()
                .unwrap()
                .iter()
                .filter(|op| !op.starts_with("search"))
                .cloned()
                .collect()
        }
    }

    impl SimilarityStore for Arc<MockStore> {
        async fn get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, RepositoryError> {
            Ok(self.records.lock().unwrap().get(id).cloned())
        }

        async fn add(&self, entries: &[NewMemory]) -> Result<Vec<MemoryRecord>, RepositoryError> {
            let ack_delay = *self.add_ack_delay.lock().unwrap();
            let mut created = Vec::new();
            for entry in entries {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                let record = MemoryRecord {
                    id: MemoryId::from(format!("new-{n}")),
                    content: entry.content.clone(),
                    embedding: entry.embedding.clone(),
                    metadata: entry.metadata.clone(),
                    created_at: Utc::now(),
                    updated_at: None,
                };
                self.ops.lock().unwrap().push(format!("add:{}", record.id));
                self.records
                    .lock()
                    .unwrap()
                    .insert(record.id.clone(), record.clone());
                created.push(record);
            }
            if let Some(delay) = ack_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(created)
        }

        async fn update(
            &self,
            id: &MemoryId,
            entry: &NewMemory,
        ) -> Result<MemoryRecord, RepositoryError> {
            if *self.fail_update.lock().unwrap() {
                return Err(RepositoryError::Connection);
            }
            let mut records = self.records.lock().unwrap();
            let record = records.get_mut(id).ok_or(RepositoryError::NotFound)?;
            record.content = entry.content.clone();
            record.embedding = entry.embedding.clone();
            record.metadata = entry.metadata.clone();
            record.updated_at = Some(Utc::now());
            self.ops.lock().unwrap().push(format!("update:{id}"));
            Ok(record.clone())
        }

        async fn delete(&self, id: &MemoryId) -> Result<(), RepositoryError> {
            self.records.lock().unwrap().remove(id);
            self.ops.lock().unwrap().push(format!("delete:{id}"));
            Ok(())
        }

        async fn search(
            &self,
            embedding: &[f32],
            options: &SearchOptions,
        ) -> Result<Vec<RankedMemory>, RepositoryError> {
            self.ops.lock().unwrap().push("search".to_string());
            let scripted = self.search_results.lock().unwrap();
            let hits = scripted
                .iter()
                .find(|(query, _)| query.as_slice() == embedding)
                .map(|(_, hits)| hits.clone())
                .unwrap_or_default();
            Ok(hits
                .into_iter()
                .take(options.top_k)
                .enumerate()
                .map(|(rank, record)| RankedMemory {
                    record,
                    distance: rank as f32 * 0.1,
                })
                .collect())
        }

        async fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>, RepositoryError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .skip(options.offset)
                .take(options.limit)
                .cloned()
                .collect())
        }

        async fn count(&self) -> Result<u64, RepositoryError> {
            Ok(self.records.lock().unwrap().len() as u64)
        }
    }

    /// Embedder with fixed vectors per text and optional per-text latency.
    #[derive(Default)]
    struct MockEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<String>>,
        wrong_dimension: bool,
    }

    impl MockEmbedder {
        fn with(pairs: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.clone()))
                    .collect(),
                ..Default::default()
            }
        }

        fn vector_for(&self, text: &str) -> Vec<f32> {
            if let Some(v) = self.vectors.get(text) {
                return v.clone();
            }
            let sum: u32 = text.bytes().map(u32::from).sum();
            vec![sum as f32, text.len() as f32, 1.0]
        }
    }

    impl Embedder for Arc<MockEmbedder> {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
            let mut out = Vec::new();
            for text in texts {
                self.calls.lock().unwrap().push(text.clone());
                if let Some(delay) = self.delays.get(text) {
                    tokio::time::sleep(*delay).await;
                }
                let mut v = self.vector_for(text);
                if self.wrong_dimension {
                    v.push(0.0);
                }
                out.push(v);
            }
            Ok(out)
        }

        fn model_name(&self) -> &str {
            "mock-embedder"
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    struct MockExtractor {
        result: Result<Vec<String>, String>,
    }

    impl MockExtractor {
        fn facts(facts: &[&str]) -> Self {
            Self {
                result: Ok(facts.iter().map(|f| f.to_string()).collect()),
            }
        }
    }

    impl FactExtractor for MockExtractor {
        async fn extract(
            &self,
            _request: &ExtractionRequest,
        ) -> Result<ExtractionResponse, LlmError> {
            match &self.result {
                Ok(facts) => Ok(ExtractionResponse {
                    facts: facts.clone(),
                }),
                Err(message) => Err(LlmError::Deserialization(message.clone())),
            }
        }
    }

    #[derive(Default)]
    struct MockDecider {
        actions: Vec<MergeAction>,
        delay: Option<Duration>,
        requests: Mutex<Vec<DecisionRequest>>,
    }

    impl MockDecider {
        fn actions(actions: Vec<MergeAction>) -> Self {
            Self {
                actions,
                ..Default::default()
            }
        }
    }

    impl MergeDecider for Arc<MockDecider> {
        async fn decide(&self, request: &DecisionRequest) -> Result<DecisionResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(DecisionResponse {
                actions: self.actions.clone(),
            })
        }
    }

    type TestEngine = MemoryEngine<Arc<MockStore>, Arc<MockEmbedder>, MockExtractor, Arc<MockDecider>>;

    fn engine(
        store: &Arc<MockStore>,
        embedder: MockEmbedder,
        extractor: MockExtractor,
        decider: &Arc<MockDecider>,
    ) -> TestEngine {
        MemoryEngine::new(
            store.clone(),
            Arc::new(embedder),
            extractor,
            decider.clone(),
            EngineSettings::default(),
        )
    }

    fn paris() -> Vec<f32> {
        vec![1.0, 0.0, 0.0]
    }

    fn hiking() -> Vec<f32> {
        vec![0.0, 1.0, 0.0]
    }

    // --- Properties ---

    #[tokio::test]
    async fn test_empty_extraction_sends_empty_decision_and_mutates_nothing() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider::default());
        let engine = engine(&store, MockEmbedder::default(), MockExtractor::facts(&[]), &decider);

        let result = engine.add("Hello there!").await.unwrap();

        assert!(result.is_empty());
        let requests = decider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], DecisionRequest::default());
        assert!(store.ops.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_two_new_facts_are_added() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider::actions(vec![
            MergeAction {
                reference: Some(0),
                text: "lives in Paris".to_string(),
                kind: ActionKind::Add,
            },
            MergeAction {
                reference: Some(0),
                text: "loves hiking".to_string(),
                kind: ActionKind::Add,
            },
        ]));
        let embedder = MockEmbedder::with(&[("lives in Paris", paris()), ("loves hiking", hiking())]);
        let engine = engine(
            &store,
            embedder,
            MockExtractor::facts(&["lives in Paris", "loves hiking"]),
            &decider,
        );

        let result = engine.add("I live in Paris and I love hiking.").await.unwrap();

        let request = decider.requests.lock().unwrap()[0].clone();
        assert_eq!(request.new_facts, vec!["lives in Paris", "loves hiking"]);
        assert!(request.old_memory.is_empty());

        let contents: Vec<&str> = result.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["lives in Paris", "loves hiking"]);
        assert!(result.iter().all(|m| m.metadata.is_empty() && m.updated_at.is_none()));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_add_reuses_cached_fact_embedding() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider::actions(vec![MergeAction::add("lives in Paris")]));
        let embedder = Arc::new(MockEmbedder::with(&[("lives in Paris", paris())]));
        let engine = MemoryEngine::new(
            store.clone(),
            embedder.clone(),
            MockExtractor::facts(&["lives in Paris"]),
            decider.clone(),
            EngineSettings::default(),
        );

        let result = engine.add("I live in Paris").await.unwrap();

        assert_eq!(*embedder.calls.lock().unwrap(), vec!["lives in Paris"]);
        let stored = store.record(result[0].id.as_str()).unwrap();
        assert_eq!(stored.embedding, paris());
    }

    #[tokio::test]
    async fn test_add_with_new_text_computes_fresh_embedding() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider::actions(vec![MergeAction::add(
            "lives in Paris, France",
        )]));
        let embedder = Arc::new(MockEmbedder::with(&[
            ("lives in Paris", paris()),
            ("lives in Paris, France", vec![0.9, 0.1, 0.0]),
        ]));
        let engine = MemoryEngine::new(
            store.clone(),
            embedder.clone(),
            MockExtractor::facts(&["lives in Paris"]),
            decider.clone(),
            EngineSettings::default(),
        );

        let result = engine.add("I live in Paris").await.unwrap();

        assert_eq!(
            *embedder.calls.lock().unwrap(),
            vec!["lives in Paris", "lives in Paris, France"]
        );
        assert_eq!(
            store.record(result[0].id.as_str()).unwrap().embedding,
            vec![0.9, 0.1, 0.0]
        );
    }

    #[tokio::test]
    async fn test_scenario_update_replaces_existing_record() {
        let store = Arc::new(MockStore::default());
        let berlin = store.insert("m-berlin", "lives in Berlin", vec![0.8, 0.2, 0.0]);
        store.script_search(paris(), vec![berlin]);

        let decider = Arc::new(MockDecider::actions(vec![MergeAction::update(
            0,
            "lives in Paris",
        )]));
        let engine = engine(
            &store,
            MockEmbedder::with(&[("lives in Paris", paris())]),
            MockExtractor::facts(&["lives in Paris"]),
            &decider,
        );

        let result = engine.add("I moved to Paris").await.unwrap();

        let request = decider.requests.lock().unwrap()[0].clone();
        assert_eq!(request.old_memory.len(), 1);
        assert_eq!(request.old_memory[0].id, 0);
        assert_eq!(request.old_memory[0].content, "lives in Berlin");

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, MemoryId::from("m-berlin"));
        assert_eq!(result[0].content, "lives in Paris");
        assert!(result[0].updated_at.is_some());

        let stored = store.record("m-berlin").unwrap();
        assert_eq!(stored.content, "lives in Paris");
        assert_eq!(stored.embedding, paris());
    }

    #[tokio::test]
    async fn test_scenario_unissued_reference_keeps_prior_adds() {
        let store = Arc::new(MockStore::default());
        let hits: Vec<MemoryRecord> = (0..3)
            .map(|i| store.insert(&format!("m-{i}"), &format!("old {i}"), vec![i as f32, 5.0, 5.0]))
            .collect();
        store.script_search(paris(), hits);

        let decider = Arc::new(MockDecider::actions(vec![
            MergeAction::add("loves hiking"),
            MergeAction::update(7, "lives in Paris"),
            MergeAction::add("never applied"),
        ]));
        let engine = engine(
            &store,
            MockEmbedder::with(&[("lives in Paris", paris())]),
            MockExtractor::facts(&["lives in Paris"]),
            &decider,
        );

        let err = engine.add("I live in Paris").await.unwrap_err();

        match &err {
            ReconcileError::ReferenceNotFound {
                reference,
                action_index,
                applied,
            } => {
                assert_eq!(*reference, UnresolvedReference::Temporary(7));
                assert_eq!(*action_index, 1);
                assert_eq!(applied.len(), 1);
                assert_eq!(applied[0].kind, ActionKind::Add);
            }
            other => panic!("expected ReferenceNotFound, got {other:?}"),
        }
        assert!(err.is_partial());
        assert_eq!(store.len(), 4);
        assert_eq!(store.mutations(), vec!["add:new-0"]);
    }

    #[tokio::test]
    async fn test_update_without_reference_is_reference_not_found() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider::actions(vec![MergeAction {
            reference: None,
            text: "x".to_string(),
            kind: ActionKind::Update,
        }]));
        let engine = engine(&store, MockEmbedder::default(), MockExtractor::facts(&["x"]), &decider);

        let err = engine.add("x").await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::ReferenceNotFound {
                reference: UnresolvedReference::Missing,
                action_index: 0,
                ..
            }
        ));
        assert!(!err.is_partial());
    }

    #[tokio::test]
    async fn test_update_of_vanished_record_is_reference_not_found() {
        let store = Arc::new(MockStore::default());
        // Retrieved snapshot whose record is no longer in the store.
        let ghost = MemoryRecord {
            id: MemoryId::from("m-ghost"),
            content: "lives in Berlin".to_string(),
            embedding: vec![0.8, 0.2, 0.0],
            metadata: Metadata::new(),
            created_at: Utc::now(),
            updated_at: None,
        };
        store.script_search(paris(), vec![ghost]);

        let decider = Arc::new(MockDecider::actions(vec![MergeAction::update(
            0,
            "lives in Paris",
        )]));
        let engine = engine(
            &store,
            MockEmbedder::with(&[("lives in Paris", paris())]),
            MockExtractor::facts(&["lives in Paris"]),
            &decider,
        );

        let err = engine.add("I live in Paris").await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::ReferenceNotFound {
                reference: UnresolvedReference::Persisted(ref id),
                ..
            } if id.as_str() == "m-ghost"
        ));
    }

    #[tokio::test]
    async fn test_delete_of_absent_mapped_record_is_noop() {
        let store = Arc::new(MockStore::default());
        let ghost = MemoryRecord {
            id: MemoryId::from("m-ghost"),
            content: "old".to_string(),
            embedding: vec![0.5, 0.5, 0.0],
            metadata: Metadata::new(),
            created_at: Utc::now(),
            updated_at: None,
        };
        store.script_search(paris(), vec![ghost]);

        let decider = Arc::new(MockDecider::actions(vec![
            MergeAction::delete(0),
            MergeAction::delete(0),
        ]));
        let engine = engine(
            &store,
            MockEmbedder::with(&[("lives in Paris", paris())]),
            MockExtractor::facts(&["lives in Paris"]),
            &decider,
        );

        let result = engine.add("I live in Paris").await.unwrap();
        assert!(result.is_empty());
        assert_eq!(store.mutations(), vec!["delete:m-ghost", "delete:m-ghost"]);
    }

    #[tokio::test]
    async fn test_duplicate_candidate_targetable_under_both_ids() {
        let store = Arc::new(MockStore::default());
        let shared = store.insert("m-shared", "outdoorsy, lives in Berlin", vec![0.5, 0.5, 0.0]);
        store.script_search(paris(), vec![shared.clone()]);
        store.script_search(hiking(), vec![shared]);

        let decider = Arc::new(MockDecider::actions(vec![
            MergeAction::update(0, "lives in Paris"),
            MergeAction::update(1, "loves hiking, lives in Paris"),
        ]));
        let engine = engine(
            &store,
            MockEmbedder::with(&[("lives in Paris", paris()), ("loves hiking", hiking())]),
            MockExtractor::facts(&["lives in Paris", "loves hiking"]),
            &decider,
        );

        let result = engine.add("I live in Paris and love hiking").await.unwrap();

        let request = decider.requests.lock().unwrap()[0].clone();
        let ids: Vec<u32> = request.old_memory.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1]);

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|m| m.id.as_str() == "m-shared"));
        // The second update observes the first.
        assert_eq!(
            store.record("m-shared").unwrap().content,
            "loves hiking, lives in Paris"
        );
        assert_eq!(store.mutations(), vec!["update:m-shared", "update:m-shared"]);
    }

    #[tokio::test]
    async fn test_temporary_ids_follow_fact_order_under_concurrency() {
        let store = Arc::new(MockStore::default());
        let a = store.insert("m-a", "a", vec![0.1, 0.0, 0.0]);
        let b = store.insert("m-b", "b", vec![0.2, 0.0, 0.0]);
        let c = store.insert("m-c", "c", vec![0.3, 0.0, 0.0]);
        store.script_search(paris(), vec![c.clone(), a.clone()]);
        store.script_search(hiking(), vec![b.clone()]);

        let mut embedder =
            MockEmbedder::with(&[("lives in Paris", paris()), ("loves hiking", hiking())]);
        // The first fact finishes last.
        embedder
            .delays
            .insert("lives in Paris".to_string(), Duration::from_millis(40));

        let decider = Arc::new(MockDecider::default());
        let engine = engine(
            &store,
            embedder,
            MockExtractor::facts(&["lives in Paris", "loves hiking"]),
            &decider,
        );
        assert!(engine.settings().concurrent_retrieval);

        engine.add("first").await.unwrap();
        engine.add("second").await.unwrap();

        let requests = decider.requests.lock().unwrap();
        let contents: Vec<&str> = requests[0]
            .old_memory
            .iter()
            .map(|c| c.content.as_str())
            .collect();
        assert_eq!(contents, vec!["c", "a", "b"]);
        assert_eq!(requests[0], requests[1]);
    }

    #[tokio::test]
    async fn test_sequential_retrieval_same_aggregation() {
        let store = Arc::new(MockStore::default());
        let a = store.insert("m-a", "a", vec![0.1, 0.0, 0.0]);
        let b = store.insert("m-b", "b", vec![0.2, 0.0, 0.0]);
        store.script_search(paris(), vec![a]);
        store.script_search(hiking(), vec![b]);

        let decider = Arc::new(MockDecider::default());
        let engine = MemoryEngine::new(
            store.clone(),
            Arc::new(MockEmbedder::with(&[
                ("lives in Paris", paris()),
                ("loves hiking", hiking()),
            ])),
            MockExtractor::facts(&["lives in Paris", "loves hiking"]),
            decider.clone(),
            EngineSettings {
                concurrent_retrieval: false,
                ..Default::default()
            },
        );

        engine.add("x").await.unwrap();

        let request = decider.requests.lock().unwrap()[0].clone();
        let contents: Vec<&str> = request.old_memory.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_add_count_grows_by_applied_adds_before_failure() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider::actions(vec![
            MergeAction::add("one"),
            MergeAction::noop("two"),
            MergeAction::add("three"),
            MergeAction::delete(42),
            MergeAction::add("four"),
        ]));
        let engine = engine(&store, MockEmbedder::default(), MockExtractor::facts(&["one"]), &decider);

        let err = engine.add("x").await.unwrap_err();

        assert_eq!(store.len(), 2);
        let kinds: Vec<ActionKind> = err.applied().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Add, ActionKind::Noop, ActionKind::Add]);
    }

    #[tokio::test]
    async fn test_noop_and_delete_excluded_from_result() {
        let store = Arc::new(MockStore::default());
        let old = store.insert("m-old", "old", vec![0.5, 0.5, 0.0]);
        store.script_search(paris(), vec![old]);

        let decider = Arc::new(MockDecider::actions(vec![
            MergeAction::noop("lives in Paris"),
            MergeAction::delete(0),
            MergeAction::add("lives in Paris"),
        ]));
        let engine = engine(
            &store,
            MockEmbedder::with(&[("lives in Paris", paris())]),
            MockExtractor::facts(&["lives in Paris"]),
            &decider,
        );

        let result = engine.add("x").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content, "lives in Paris");
        assert!(store.record("m-old").is_none());
    }

    #[tokio::test]
    async fn test_extraction_failure_aborts_before_mutation() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider::actions(vec![MergeAction::add("x")]));
        let engine = engine(
            &store,
            MockEmbedder::default(),
            MockExtractor {
                result: Err("not json".to_string()),
            },
            &decider,
        );

        let err = engine.add("x").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Extraction(LlmError::Deserialization(_))));
        assert!(decider.requests.lock().unwrap().is_empty());
        assert!(store.ops.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_dimension_mismatch_is_rejected() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider::default());
        let embedder = MockEmbedder {
            wrong_dimension: true,
            ..Default::default()
        };
        let engine = engine(&store, embedder, MockExtractor::facts(&["x"]), &decider);

        let err = engine.add("x").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Embedding(RepositoryError::Query(_))));
        assert!(store.ops.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decision_timeout_reports_stage() {
        let store = Arc::new(MockStore::default());
        let decider = Arc::new(MockDecider {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let engine = MemoryEngine::new(
            store.clone(),
            Arc::new(MockEmbedder::default()),
            MockExtractor::facts(&[]),
            decider.clone(),
            EngineSettings {
                collaborator_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let err = engine.add("x").await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Timeout {
                stage: Stage::Decision,
                after_ms: 20
            }
        ));
        assert!(store.ops.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_store_write_is_not_reported_as_failed() {
        let store = Arc::new(MockStore::default());
        *store.add_ack_delay.lock().unwrap() = Some(Duration::from_millis(200));
        let decider = Arc::new(MockDecider::actions(vec![MergeAction::add("lives in Paris")]));
        let engine = MemoryEngine::new(
            store.clone(),
            Arc::new(MockEmbedder::with(&[("lives in Paris", paris())])),
            MockExtractor::facts(&["lives in Paris"]),
            decider.clone(),
            EngineSettings {
                collaborator_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let result = engine.add("I live in Paris").await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content, "lives in Paris");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_during_apply_wraps_source() {
        let store = Arc::new(MockStore::default());
        let old = store.insert("m-old", "old", vec![0.5, 0.5, 0.0]);
        store.script_search(paris(), vec![old]);
        *store.fail_update.lock().unwrap() = true;

        let decider = Arc::new(MockDecider::actions(vec![
            MergeAction::add("new fact"),
            MergeAction::update(0, "lives in Paris"),
        ]));
        let engine = engine(
            &store,
            MockEmbedder::with(&[("lives in Paris", paris())]),
            MockExtractor::facts(&["lives in Paris"]),
            &decider,
        );

        let err = engine.add("x").await.unwrap_err();
        match err {
            ReconcileError::ApplyFailed {
                action_index,
                applied,
                source,
            } => {
                assert_eq!(action_index, 1);
                assert_eq!(applied.len(), 1);
                assert!(matches!(*source, ReconcileError::Store(RepositoryError::Connection)));
            }
            other => panic!("expected ApplyFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_returns_ranked_hits_without_mutation() {
        let store = Arc::new(MockStore::default());
        let near = store.insert("m-near", "lives in Paris", paris());
        let far = store.insert("m-far", "likes Paris", vec![0.7, 0.3, 0.0]);
        store.script_search(paris(), vec![near, far]);

        let decider = Arc::new(MockDecider::default());
        let engine = engine(
            &store,
            MockEmbedder::with(&[("where do I live", paris())]),
            MockExtractor::facts(&[]),
            &decider,
        );

        let hits = engine.search("where do I live").await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["m-near", "m-far"]);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(store.mutations().is_empty());
        assert!(decider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_passthroughs() {
        let store = Arc::new(MockStore::default());
        store.insert("m-1", "one", paris());
        store.insert("m-2", "two", hiking());
        let decider = Arc::new(MockDecider::default());
        let engine = engine(&store, MockEmbedder::default(), MockExtractor::facts(&[]), &decider);

        let page = engine
            .list(&ListOptions {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, MemoryId::from("m-1"));

        assert_eq!(engine.count().await.unwrap(), 2);
        assert!(engine.get(&MemoryId::from("m-2")).await.unwrap().is_some());

        engine.delete(&MemoryId::from("m-2")).await.unwrap();
        engine.delete(&MemoryId::from("m-2")).await.unwrap();
        assert!(engine.get(&MemoryId::from("m-2")).await.unwrap().is_none());
        assert_eq!(engine.count().await.unwrap(), 1);
    }
}
