//! Textual MOC - text, media and embeddings attached to sky coverage maps.
//!
//! A Multi-Order Coverage map (MOC) describes a region of the sky as a set of
//! HEALPix cells at several depths. This library wraps such a map in a JSON
//! document that also carries free text, per-cell labels, a multimedia link,
//! an image cutout link, authorship metadata and a text embedding.
//!
//! # Architecture
//!
//! - **models**: The persisted [`Document`]
//! - **coverage**: Coverage map abstraction and a HEALPix MOC implementation
//! - **fetch**: Resolving custom text from URLs, files or literals
//! - **embedding**: Embedding providers (Ollama server, local fastembed)
//! - **render**: Presentation backends
//! - **session**: [`TextualMoc`], the editing session tying it all together
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use textual_moc::{
//!     embedding::ollama::OllamaEmbedding,
//!     fetch::{FetchConfig, HttpTextFetcher},
//!     HealpixMoc, TextualMoc,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let moc = HealpixMoc::from_cells([(3, 120), (3, 121)])?;
//!     let mut session = TextualMoc::new(Some(Arc::new(moc)))
//!         .with_text_fetcher(Arc::new(HttpTextFetcher::new(FetchConfig::default())?))
//!         .with_embedding_provider(Arc::new(OllamaEmbedding::new(None)?));
//!
//!     session.annotate_cell(3, 120, "Bright knot")?;
//!     session.attach_content("Hello MOC!", None, None).await?;
//!     session.generate_embedding(textual_moc::DEFAULT_EMBEDDING_MODEL).await?;
//!     session.save("moc.json")?;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod coverage;
pub mod embedding;
pub mod fetch;
pub mod models;
pub mod render;
pub mod session;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at the crate root
pub use coverage::{CoverageMap, CoverageMapEngine, HealpixMoc, JsonMocEngine};
pub use embedding::EmbeddingProvider;
pub use fetch::TextFetcher;
pub use models::Document;
pub use render::Renderer;
pub use session::{RenderOptions, SessionError, TextualMoc};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
