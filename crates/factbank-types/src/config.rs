//! Global configuration types for factbank.
//!
//! `FactbankConfig` represents the top-level `config.toml` that selects the
//! store backend, embedding and reasoning providers, and engine tuning.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::memory::{DEFAULT_SEARCH_THRESHOLD, DEFAULT_TOP_K, SearchOptions};

/// Top-level configuration.
///
/// Loaded from `~/.factbank/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactbankConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Similarity search defaults used for candidate retrieval and `search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum cosine distance for a hit.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_threshold() -> f32 {
    DEFAULT_SEARCH_THRESHOLD
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
        }
    }
}

impl SearchConfig {
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            top_k: self.top_k,
            threshold: self.threshold,
        }
    }
}

/// Reconciliation engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for any single collaborator call.
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,
    /// Run per-fact embedding and search concurrently.
    #[serde(default = "default_true")]
    pub concurrent_retrieval: bool,
}

fn default_collaborator_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
            concurrent_retrieval: true,
        }
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local ONNX inference.
    Fastembed,
    /// Any OpenAI-compatible `/embeddings` endpoint.
    #[serde(rename = "openai")]
    OpenAi,
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingProviderKind::Fastembed => write!(f, "fastembed"),
            EmbeddingProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastembed" => Ok(EmbeddingProviderKind::Fastembed),
            "openai" => Ok(EmbeddingProviderKind::OpenAi),
            other => Err(format!("invalid embedding provider: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    /// Base URL for the `openai` provider.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key for the `openai` provider.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Fastembed
}

fn default_embedding_model() -> String {
    "bge-small-en-v1.5".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

/// Which OpenAI-compatible endpoint the reasoning services talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    /// Any other endpoint; requires `base_url`.
    Custom,
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProviderKind::OpenAi => write!(f, "openai"),
            LlmProviderKind::Ollama => write!(f, "ollama"),
            LlmProviderKind::Custom => write!(f, "custom"),
        }
    }
}

/// Reasoning service (fact extraction and merge decision) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProviderKind,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f64,
}

fn default_llm_provider() -> LlmProviderKind {
    LlmProviderKind::OpenAi
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

/// Which similarity store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Embedded LanceDB on disk.
    Lance,
    /// Process-local, lost on exit.
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Lance => write!(f, "lance"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    /// Directory for the LanceDB store. Defaults to `{data_dir}/vector_store`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Lance
}

fn default_table() -> String {
    "memories".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
            table: default_table(),
        }
    }
}
