//! BoxSimilarityStore -- object-safe dynamic dispatch wrapper for SimilarityStore.
//!
//! Follows the same blanket-impl pattern as BoxLlmProvider:
//! 1. Define an object-safe `SimilarityStoreDyn` trait with boxed futures
//! 2. Blanket-impl `SimilarityStoreDyn` for all `T: SimilarityStore`
//! 3. `BoxSimilarityStore` wraps `Box<dyn SimilarityStoreDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use factbank_types::error::RepositoryError;
use factbank_types::memory::{
    ListOptions, MemoryId, MemoryRecord, NewMemory, RankedMemory, SearchOptions,
};

use super::store::SimilarityStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`SimilarityStore`] with boxed futures.
pub trait SimilarityStoreDyn: Send + Sync {
    fn get_boxed<'a>(&'a self, id: &'a MemoryId) -> BoxFuture<'a, Option<MemoryRecord>>;

    fn add_boxed<'a>(&'a self, entries: &'a [NewMemory]) -> BoxFuture<'a, Vec<MemoryRecord>>;

    fn update_boxed<'a>(
        &'a self,
        id: &'a MemoryId,
        entry: &'a NewMemory,
    ) -> BoxFuture<'a, MemoryRecord>;

    fn delete_boxed<'a>(&'a self, id: &'a MemoryId) -> BoxFuture<'a, ()>;

    fn search_boxed<'a>(
        &'a self,
        embedding: &'a [f32],
        options: &'a SearchOptions,
    ) -> BoxFuture<'a, Vec<RankedMemory>>;

    fn list_boxed<'a>(&'a self, options: &'a ListOptions) -> BoxFuture<'a, Vec<MemoryRecord>>;

    fn count_boxed(&self) -> BoxFuture<'_, u64>;
}

/// Blanket implementation: any `SimilarityStore` automatically implements `SimilarityStoreDyn`.
impl<T: SimilarityStore> SimilarityStoreDyn for T {
    fn get_boxed<'a>(&'a self, id: &'a MemoryId) -> BoxFuture<'a, Option<MemoryRecord>> {
        Box::pin(self.get(id))
    }

    fn add_boxed<'a>(&'a self, entries: &'a [NewMemory]) -> BoxFuture<'a, Vec<MemoryRecord>> {
        Box::pin(self.add(entries))
    }

    fn update_boxed<'a>(
        &'a self,
        id: &'a MemoryId,
        entry: &'a NewMemory,
    ) -> BoxFuture<'a, MemoryRecord> {
        Box::pin(self.update(id, entry))
    }

    fn delete_boxed<'a>(&'a self, id: &'a MemoryId) -> BoxFuture<'a, ()> {
        Box::pin(self.delete(id))
    }

    fn search_boxed<'a>(
        &'a self,
        embedding: &'a [f32],
        options: &'a SearchOptions,
    ) -> BoxFuture<'a, Vec<RankedMemory>> {
        Box::pin(self.search(embedding, options))
    }

    fn list_boxed<'a>(&'a self, options: &'a ListOptions) -> BoxFuture<'a, Vec<MemoryRecord>> {
        Box::pin(self.list(options))
    }

    fn count_boxed(&self) -> BoxFuture<'_, u64> {
        Box::pin(self.count())
    }
}

/// Type-erased similarity store for runtime backend selection.
///
/// Since `SimilarityStore` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxSimilarityStore` delegates to the inner `SimilarityStoreDyn`
/// and itself implements `SimilarityStore`, so it can drive a `MemoryEngine`.
pub struct BoxSimilarityStore {
    inner: Box<dyn SimilarityStoreDyn + Send + Sync>,
}

impl BoxSimilarityStore {
    /// Wrap a concrete `SimilarityStore` in a type-erased box.
    pub fn new<T: SimilarityStore + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }
}

impl SimilarityStore for BoxSimilarityStore {
    async fn get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, RepositoryError> {
        self.inner.get_boxed(id).await
    }

    async fn add(&self, entries: &[NewMemory]) -> Result<Vec<MemoryRecord>, RepositoryError> {
        self.inner.add_boxed(entries).await
    }

    async fn update(
        &self,
        id: &MemoryId,
        entry: &NewMemory,
    ) -> Result<MemoryRecord, RepositoryError> {
        self.inner.update_boxed(id, entry).await
    }

    async fn delete(&self, id: &MemoryId) -> Result<(), RepositoryError> {
        self.inner.delete_boxed(id).await
    }

    async fn search(
        &self,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<RankedMemory>, RepositoryError> {
        self.inner.search_boxed(embedding, options).await
    }

    async fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>, RepositoryError> {
        self.inner.list_boxed(options).await
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        self.inner.count_boxed().await
    }
}
