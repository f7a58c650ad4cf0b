//! LLM provider abstractions for factbank.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `structured`: parsing of schema-constrained responses

pub mod box_provider;
pub mod provider;
pub mod structured;
