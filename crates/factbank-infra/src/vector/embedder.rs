//! FastEmbed-based local embedding generator.
//!
//! Implements the `Embedder` trait from `factbank-core` with ONNX runtime
//! inference. The model is downloaded and loaded on first use, then shared by
//! every later call.

use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use factbank_core::memory::embedder::Embedder;
use factbank_types::error::RepositoryError;

/// Map a configured model name to a fastembed model and its dimension.
pub fn resolve_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    let resolved = match name {
        "bge-small-en-v1.5" | "BGESmallENV15" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" | "BGEBaseENV15" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en-v1.5" | "BGELargeENV15" => (EmbeddingModel::BGELargeENV15, 1024),
        "all-MiniLM-L6-v2" | "AllMiniLML6V2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "all-MiniLM-L12-v2" | "AllMiniLML12V2" => (EmbeddingModel::AllMiniLML12V2, 384),
        "nomic-embed-text-v1.5" | "NomicEmbedTextV15" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "multilingual-e5-small" | "MultilingualE5Small" => {
            (EmbeddingModel::MultilingualE5Small, 384)
        }
        "multilingual-e5-base" | "MultilingualE5Base" => (EmbeddingModel::MultilingualE5Base, 768),
        _ => return None,
    };
    Some(resolved)
}

/// Local embedder backed by fastembed.
///
/// `TextEmbedding::embed` needs exclusive access, so the loaded model sits
/// behind a mutex and inference runs on the blocking pool.
pub struct FastEmbedder {
    model: EmbeddingModel,
    model_name: String,
    dimension: usize,
    show_download_progress: bool,
    engine: OnceCell<Arc<Mutex<TextEmbedding>>>,
}

impl FastEmbedder {
    /// Create an embedder for `model_name`, checking it produces `expected_dim` vectors.
    ///
    /// Nothing is loaded until the first `embed` call.
    pub fn from_config(model_name: &str, expected_dim: usize) -> Result<Self, RepositoryError> {
        let (model, dimension) = resolve_model(model_name).ok_or_else(|| {
            RepositoryError::Query(format!(
                "Unknown embedding model: '{model_name}'. Supported: bge-small-en-v1.5, bge-base-en-v1.5, all-MiniLM-L6-v2, ..."
            ))
        })?;
        if dimension != expected_dim {
            return Err(RepositoryError::Query(format!(
                "Dimension mismatch: model '{model_name}' produces {dimension}-dim vectors but config specifies {expected_dim}"
            )));
        }

        Ok(Self {
            model,
            model_name: model_name.to_string(),
            dimension,
            show_download_progress: false,
            engine: OnceCell::new(),
        })
    }

    /// Show a progress bar while the model downloads (CLI use).
    pub fn with_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }

    async fn engine(&self) -> Result<Arc<Mutex<TextEmbedding>>, RepositoryError> {
        self.engine
            .get_or_try_init(|| async {
                tracing::info!(model = %self.model_name, "Initializing embedding model");
                let options = InitOptions::new(self.model.clone())
                    .with_show_download_progress(self.show_download_progress);

                let engine = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
                    .await
                    .map_err(|e| RepositoryError::Query(format!("Model init task failed: {e}")))?
                    .map_err(|e| {
                        RepositoryError::Query(format!("Failed to initialize embedding model: {e}"))
                    })?;

                tracing::info!(
                    model = %self.model_name,
                    dimension = self.dimension,
                    "Embedding model initialized"
                );
                Ok(Arc::new(Mutex::new(engine)))
            })
            .await
            .cloned()
    }
}

impl Embedder for FastEmbedder {
    #[tracing::instrument(name = "fastembed_embed", skip_all, fields(batch_size = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let engine = self.engine().await?;
        let texts = texts.to_vec();

        // fastembed is synchronous; keep it off the async workers
        tokio::task::spawn_blocking(move || {
            let mut model = engine
                .lock()
                .map_err(|_| RepositoryError::Query("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| RepositoryError::Query(format!("Failed to generate embeddings: {e}")))
        })
        .await
        .map_err(|e| RepositoryError::Query(format!("Embedding task failed: {e}")))?
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
