//! Similarity stores and embedders.
//!
//! LanceDB and in-memory implementations of `SimilarityStore`, plus a local
//! fastembed embedder and an OpenAI-compatible HTTP embedder.

pub mod embedder;
pub mod in_memory;
pub mod lance;
pub mod memory;
pub mod openai_embedder;
pub mod schema;
