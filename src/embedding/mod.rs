//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for turning a textual MOC's custom text
//! into a vector and ships two backends:
//!
//! - [`ollama::OllamaEmbedding`]: a running Ollama server
//! - [`fastembed::FastEmbedProvider`]: local ONNX models through fastembed
//!
//! The model is chosen per call so one provider can serve several models.

pub mod fastembed;
pub mod ollama;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input (e.g., empty text, unknown model)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., client or model initialization)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// # Example Usage
/// ```ignore
/// let provider = OllamaEmbedding::new(None)?;
/// let vector = provider.embed("Crab Nebula remnant", "nomic-embed-text").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for `text` using `model`.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the model is unknown or generation fails
    async fn embed(&self, text: &str, model: &str) -> EmbeddingResult<Vec<f64>>;

    /// Backend identifier, used for logging.
    fn name(&self) -> &str;
}

/// Reject text that carries nothing to embed.
pub(crate) fn ensure_non_empty(text: &str) -> EmbeddingResult<()> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
    }
    Ok(())
}
