//! FastEmbed embedding provider implementation.
//!
//! This module provides an implementation of the `EmbeddingProvider` trait
//! using the fastembed library for local embedding generation.
//!
//! Models are initialized lazily on first use and cached per model name, so
//! only the models a session actually asks for are downloaded.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::{ensure_non_empty, EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Map an Ollama-style model name onto the matching fastembed model.
///
/// Names are matched case-insensitively. `nomic-embed-text` resolves to v1.5,
/// the version Ollama serves under that tag.
///
/// # Errors
/// Returns `EmbeddingError::InvalidInput` for names with no local equivalent
pub fn resolve_model(name: &str) -> EmbeddingResult<EmbeddingModel> {
    let model = match name.trim().to_ascii_lowercase().as_str() {
        "nomic-embed-text" | "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
        "nomic-embed-text-v1" => EmbeddingModel::NomicEmbedTextV1,
        "all-minilm" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
        "paraphrase-multilingual-minilm-l12-v2" => EmbeddingModel::ParaphraseMLMiniLML12V2,
        "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        other => {
            return Err(EmbeddingError::InvalidInput(format!(
                "No local fastembed model matches '{}'",
                other
            )))
        }
    };
    Ok(model)
}

/// FastEmbed embedding provider.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// Initialized models keyed by the requested model name
    models: Arc<Mutex<HashMap<String, TextEmbedding>>>,

    /// Optional cache directory for model files
    cache_dir: Option<PathBuf>,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `cache_dir` - Optional cache directory for model files
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self {
            models: Arc::new(Mutex::new(HashMap::new())),
            cache_dir,
        }
    }

    fn init_model(&self, name: &str) -> EmbeddingResult<TextEmbedding> {
        let model = resolve_model(name)?;
        info!("Initializing FastEmbed model {:?} for '{}'", model, name);

        let mut init_options = InitOptions::new(model);
        if let Some(dir) = &self.cache_dir {
            init_options = init_options.with_cache_dir(dir.clone());
        }

        TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str, model: &str) -> EmbeddingResult<Vec<f64>> {
        ensure_non_empty(text)?;

        // Lock the model cache for initialization and generation
        let mut models = self.models.lock().await;
        if !models.contains_key(model) {
            let initialized = self.init_model(model)?;
            models.insert(model.to_string(), initialized);
        }
        let embedder = models
            .get_mut(model)
            .ok_or_else(|| EmbeddingError::Other(format!("Model '{}' not cached", model)))?;

        let embeddings = embedder
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .map(|vector| vector.into_iter().map(f64::from).collect())
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}

// TextEmbedding does not implement Debug
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}
