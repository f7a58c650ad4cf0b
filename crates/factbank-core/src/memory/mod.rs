//! Memory reconciliation for factbank.
//!
//! Ports for the four collaborators (similarity store, embedder, fact
//! extractor, merge decider), their type-erased wrappers, and the
//! `MemoryEngine` that reconciles new content against what is stored.

pub mod box_embedder;
pub mod box_store;
pub mod decider;
pub mod embedder;
pub mod engine;
pub mod extractor;
pub mod scope;
pub mod store;
