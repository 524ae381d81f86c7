//! Ollama embedding provider implementation.
//!
//! Talks to the `/api/embeddings` endpoint of an Ollama server, which hosts
//! models such as `nomic-embed-text`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ensure_non_empty, EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Address of a local Ollama install.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Embedding generation can be slow on first use while the model loads.
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
}

/// Ollama embedding provider configuration.
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: reqwest::Client,

    /// Server root, without trailing slash
    base_url: String,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding provider.
    ///
    /// # Arguments
    /// * `base_url` - Server root (defaults to [`DEFAULT_OLLAMA_URL`] if None)
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the HTTP client cannot be built
    pub fn new(base_url: Option<String>) -> EmbeddingResult<Self> {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbeddingError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str, model: &str) -> EmbeddingResult<Vec<f64>> {
        ensure_non_empty(text)?;

        debug!("Requesting embedding from {} with model {}", self.base_url, model);
        let response = self
            .client
            .post(self.endpoint())
            .json(&EmbeddingRequest { model, prompt: text })
            .send()
            .await
            .map_err(|e| EmbeddingError::ApiError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError(format!(
                "Ollama returned {}: {}",
                status,
                body.trim()
            )));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Other(format!("Malformed embedding response: {}", e)))?;

        if payload.embedding.is_empty() {
            return Err(EmbeddingError::Other(format!(
                "Model '{}' returned an empty embedding",
                model
            )));
        }
        Ok(payload.embedding)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
