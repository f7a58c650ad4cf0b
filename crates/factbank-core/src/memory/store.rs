//! Similarity store trait.
//!
//! Defines the persistence and semantic-search interface the reconciliation
//! engine mutates. Implementations (LanceDB, in-memory) live in factbank-infra.

use factbank_types::error::RepositoryError;
use factbank_types::memory::{
    ListOptions, MemoryId, MemoryRecord, NewMemory, RankedMemory, SearchOptions,
};

/// Trait for embedding-indexed memory storage with similarity search.
///
/// The store owns identifier assignment and timestamps. A single `update` or
/// `delete` on one identifier must be atomic; no coordination across calls is
/// implied.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait SimilarityStore: Send + Sync {
    /// Point lookup by identifier.
    fn get(
        &self,
        id: &MemoryId,
    ) -> impl std::future::Future<Output = Result<Option<MemoryRecord>, RepositoryError>> + Send;

    /// Insert entries, returning the created records in input order.
    fn add(
        &self,
        entries: &[NewMemory],
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send;

    /// Replace content, embedding and metadata of an existing record and set
    /// `updated_at`.
    ///
    /// Fails with [`RepositoryError::NotFound`] if `id` does not exist.
    fn update(
        &self,
        id: &MemoryId,
        entry: &NewMemory,
    ) -> impl std::future::Future<Output = Result<MemoryRecord, RepositoryError>> + Send;

    /// Remove a record. Idempotent: deleting an absent id is not an error.
    fn delete(
        &self,
        id: &MemoryId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Records within `options.threshold` cosine distance of `embedding`,
    /// closest first, at most `options.top_k`.
    fn search(
        &self,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> impl std::future::Future<Output = Result<Vec<RankedMemory>, RepositoryError>> + Send;

    /// A page of records ordered by identifier.
    fn list(
        &self,
        options: &ListOptions,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send;

    /// Total number of stored records.
    fn count(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
