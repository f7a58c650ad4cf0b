//! Infrastructure layer for factbank.
//!
//! Contains implementations of the traits defined in `factbank-core`: LanceDB
//! and in-memory similarity stores, local and HTTP embedders, and the
//! OpenAI-compatible LLM provider. Also owns configuration loading and
//! data-directory resolution.

pub mod config;
pub mod llm;
pub mod vector;
