//! Embeddings over an OpenAI-compatible `/v1/embeddings` endpoint.
//!
//! Works against OpenAI itself and against local servers that speak the same
//! wire format (Ollama, LM Studio, vLLM). The API key is optional for the
//! latter.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use factbank_core::memory::embedder::Embedder;
use factbank_types::error::RepositoryError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Full embeddings URL for a configured base URL.
pub fn embeddings_endpoint(base_url: &str) -> String {
    let normalized = normalize_base_url(base_url);
    if normalized.ends_with("/embeddings") {
        return normalized;
    }
    if has_version_suffix(&normalized) {
        return format!("{normalized}/embeddings");
    }
    format!("{normalized}/v1/embeddings")
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Order the returned vectors by their `index` and check one came back per input.
fn into_vectors(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, RepositoryError> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(RepositoryError::Query(format!(
            "embeddings endpoint returned {} vectors for {expected} inputs",
            data.len()
        )));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

/// [`Embedder`] calling an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
            base_url: normalize_base_url(DEFAULT_OPENAI_BASE_URL),
            model: model.into(),
            dimension,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = normalize_base_url(url);
        self
    }

    pub fn endpoint(&self) -> String {
        embeddings_endpoint(&self.base_url)
    }
}

impl Embedder for OpenAiEmbedder {
    #[tracing::instrument(
        name = "openai_embed",
        skip_all,
        fields(model = %self.model, batch_size = texts.len())
    )]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                tracing::warn!(error = %e, "Embeddings endpoint unreachable");
                RepositoryError::Connection
            } else {
                RepositoryError::Query(format!("Embeddings request failed: {e}"))
            }
        })?;

        let response = response
            .error_for_status()
            .map_err(|e| RepositoryError::Query(format!("Embeddings endpoint error: {e}")))?;

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RepositoryError::Query(format!("Invalid embeddings response: {e}")))?;

        into_vectors(body, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
