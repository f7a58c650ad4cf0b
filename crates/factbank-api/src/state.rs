//! Application state wiring the engine together.
//!
//! AppState holds the concrete engine used by both CLI and REST API. The
//! engine is generic over its four collaborators; AppState pins it to the
//! type-erased wrappers so the backends can be chosen from config at runtime.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use factbank_core::llm::box_provider::BoxLlmProvider;
use factbank_core::llm::provider::{CompletionSettings, LlmProvider};
use factbank_core::memory::box_embedder::BoxEmbedder;
use factbank_core::memory::box_store::BoxSimilarityStore;
use factbank_core::memory::decider::LlmMergeDecider;
use factbank_core::memory::engine::{EngineSettings, MemoryEngine};
use factbank_core::memory::extractor::LlmFactExtractor;
use factbank_infra::config::{load_config, resolve_api_key, resolve_data_dir, store_path};
use factbank_infra::llm::create_provider;
use factbank_infra::vector::embedder::FastEmbedder;
use factbank_infra::vector::in_memory::InMemorySimilarityStore;
use factbank_infra::vector::lance::LanceConnection;
use factbank_infra::vector::memory::LanceSimilarityStore;
use factbank_infra::vector::openai_embedder::OpenAiEmbedder;
use factbank_types::config::{EmbeddingProviderKind, FactbankConfig, StoreBackend};
use factbank_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// The engine pinned to the runtime-selected backends.
pub type Engine = MemoryEngine<BoxSimilarityStore, BoxEmbedder, LlmFactExtractor, LlmMergeDecider>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<FactbankConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load config and build every collaborator.
    ///
    /// `show_progress` enables the model download progress bar of the local
    /// embedder.
    pub async fn init(show_progress: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let store = build_store(&config, &data_dir).await?;
        let embedder = build_embedder(&config, show_progress)?;
        let provider = Arc::new(build_provider(&config)?);

        let completion = CompletionSettings::from(&config.llm);
        let engine = MemoryEngine::new(
            store,
            embedder,
            LlmFactExtractor::new(provider.clone(), completion.clone()),
            LlmMergeDecider::new(provider, completion),
            EngineSettings::from_config(&config.search, &config.engine),
        );

        tracing::info!(
            data_dir = %data_dir.display(),
            store = %config.store.backend,
            embedding = %config.embedding.provider,
            llm = %config.llm.provider,
            "Application state initialized"
        );

        Ok(Self::from_parts(engine, config, data_dir))
    }

    pub fn from_parts(engine: Engine, config: FactbankConfig, data_dir: PathBuf) -> Self {
        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
            data_dir,
        }
    }
}

async fn build_store(
    config: &FactbankConfig,
    data_dir: &std::path::Path,
) -> anyhow::Result<BoxSimilarityStore> {
    match config.store.backend {
        StoreBackend::Lance => {
            let path = store_path(&config.store, data_dir);
            let conn = LanceConnection::open(path.clone())
                .await
                .with_context(|| format!("Failed to open vector store at {}", path.display()))?;
            let store =
                LanceSimilarityStore::open(&conn, &config.store.table, config.embedding.dimension)
                    .await
                    .with_context(|| format!("Failed to open table '{}'", config.store.table))?;
            Ok(BoxSimilarityStore::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; memories are lost on exit");
            Ok(BoxSimilarityStore::new(InMemorySimilarityStore::new()))
        }
    }
}

fn build_embedder(config: &FactbankConfig, show_progress: bool) -> anyhow::Result<BoxEmbedder> {
    let cfg = &config.embedding;
    match cfg.provider {
        EmbeddingProviderKind::Fastembed => {
            let embedder = FastEmbedder::from_config(&cfg.model, cfg.dimension)
                .context("Invalid [embedding] configuration")?
                .with_download_progress(show_progress);
            Ok(BoxEmbedder::new(embedder))
        }
        EmbeddingProviderKind::OpenAi => {
            let mut embedder = OpenAiEmbedder::new(cfg.model.clone(), cfg.dimension)
                .with_api_key(resolve_api_key(&cfg.api_key_env));
            if let Some(base_url) = &cfg.base_url {
                embedder = embedder.with_base_url(base_url);
            }
            Ok(BoxEmbedder::new(embedder))
        }
    }
}

/// Build the reasoning provider.
///
/// A missing API key is not fatal here: `list`, `get`, `delete` and `status`
/// never reach the LLM. The key is demanded when `add` actually needs it.
fn build_provider(config: &FactbankConfig) -> anyhow::Result<BoxLlmProvider> {
    match create_provider(&config.llm, resolve_api_key(&config.llm.api_key_env)) {
        Ok(provider) => Ok(provider),
        Err(LlmError::AuthenticationFailed) => {
            tracing::debug!(
                env = %config.llm.api_key_env,
                "No LLM API key found; reconciliation disabled until it is set"
            );
            Ok(BoxLlmProvider::new(MissingKeyProvider {
                env: config.llm.api_key_env.clone(),
            }))
        }
        Err(e) => Err(e).context("Invalid [llm] configuration"),
    }
}

/// Stand-in provider that fails every call with `AuthenticationFailed`.
struct MissingKeyProvider {
    env: String,
}

impl LlmProvider for MissingKeyProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        tracing::warn!(env = %self.env, "LLM call attempted without an API key");
        async { Err(LlmError::AuthenticationFailed) }
    }
}
