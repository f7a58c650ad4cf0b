//! Shared domain types for factbank.
//!
//! This crate contains the types passed between the reconciliation engine,
//! its collaborators (store, embedder, reasoning services) and the outer
//! CLI/REST surfaces, along with their error types and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror, schemars.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod reconcile;
pub mod schema;
