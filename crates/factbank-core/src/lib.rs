//! Reconciliation engine and port definitions for factbank.
//!
//! This crate defines the "ports" (collaborator traits) that the infrastructure
//! layer implements, and the `MemoryEngine` that orchestrates them. It depends
//! only on `factbank-types` -- never on `factbank-infra` or any database/IO crate.

pub mod llm;
pub mod memory;
