//! Process-local similarity store.
//!
//! Same contract as the LanceDB store (cosine distance, closest first,
//! id-ordered listing) without persistence. Used for `store.backend = "memory"`
//! and as a lightweight backend in tests.

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use factbank_core::memory::store::SimilarityStore;
use factbank_types::error::RepositoryError;
use factbank_types::memory::{
    ListOptions, MemoryId, MemoryRecord, NewMemory, RankedMemory, SearchOptions,
};

use super::memory::sort_closest_first;

/// In-memory [`SimilarityStore`] keyed by id.
#[derive(Default)]
pub struct InMemorySimilarityStore {
    records: RwLock<BTreeMap<MemoryId, MemoryRecord>>,
}

impl InMemorySimilarityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cosine distance (`1 - cosine similarity`), in `[0, 2]`.
///
/// A zero vector has no direction; its distance to anything is 1.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

impl SimilarityStore for InMemorySimilarityStore {
    async fn get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, RepositoryError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn add(&self, memories: &[NewMemory]) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let mut added = Vec::with_capacity(memories.len());
        for memory in memories {
            let record = MemoryRecord {
                id: MemoryId::generate(),
                content: memory.content.clone(),
                embedding: memory.embedding.clone(),
                metadata: memory.metadata.clone(),
                created_at: now,
                updated_at: None,
            };
            records.insert(record.id.clone(), record.clone());
            added.push(record);
        }
        Ok(added)
    }

    async fn update(
        &self,
        id: &MemoryId,
        memory: &NewMemory,
    ) -> Result<MemoryRecord, RepositoryError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.content = memory.content.clone();
        record.embedding = memory.embedding.clone();
        record.metadata = memory.metadata.clone();
        record.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn delete(&self, id: &MemoryId) -> Result<(), RepositoryError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<RankedMemory>, RepositoryError> {
        let records = self.records.read().await;
        let mut ranked = Vec::new();
        for record in records.values() {
            if record.embedding.len() != query.len() {
                return Err(RepositoryError::Query(format!(
                    "query has {} components, record {} has {}",
                    query.len(),
                    record.id,
                    record.embedding.len()
                )));
            }
            let distance = cosine_distance(query, &record.embedding);
            if distance <= options.threshold {
                ranked.push(RankedMemory {
                    record: record.clone(),
                    distance,
                });
            }
        }

        sort_closest_first(&mut ranked);
        ranked.truncate(options.top_k);
        Ok(ranked)
    }

    async fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let records = self.records.read().await;
        let after = records.values().filter(|r| match &options.cursor {
            Some(cursor) => r.id > *cursor,
            None => true,
        });
        Ok(after
            .skip(options.offset)
            .take(options.limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.records.read().await.len() as u64)
    }
}
