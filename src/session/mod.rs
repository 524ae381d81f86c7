//! Textual MOC session.
//!
//! [`TextualMoc`] owns a [`Document`] and keeps it consistent across
//! annotation, content, metadata and embedding updates as well as load/save
//! cycles. Collaborators (text fetcher, embedding provider, renderer, coverage
//! map engine) are injected; asking for a capability whose collaborator was
//! never configured fails with [`SessionError::CollaboratorUnavailable`].
//!
//! Every operation either succeeds or leaves the document exactly as it was.
//!
//! # Example
//!
//! ```ignore
//! let moc = Arc::new(HealpixMoc::from_cells([(3, 120), (3, 121)])?);
//! let mut session = TextualMoc::new(Some(moc))
//!     .with_text_fetcher(Arc::new(HttpTextFetcher::new(FetchConfig::default())?));
//!
//! session.annotate_cell(3, 120, "Bright knot")?;
//! session
//!     .attach_content("Hello MOC!", Some("https://example.com"), None)
//!     .await?;
//! session.update_metadata(Some("Jane Doe"), None);
//! session.save("moc.json")?;
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::coverage::{CoverageMap, CoverageMapEngine};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::fetch::{is_http_url, FetchError, TextFetcher};
use crate::models::Document;
use crate::render::{RenderError, Renderer};

/// Format of the `date` metadata field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format of the `last_text_update` field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const NO_TEXT: &str = "No custom text available.";
pub const NO_MEDIA: &str = "No multimedia URL available.";
pub const NO_IMAGE: &str = "No image URL available.";
pub const NO_EMBEDDING: &str = "No embedding available.";
pub const NO_EMBEDDING_PLOT: &str = "No embedding available to plot.";
pub const NO_AREA: &str = "No MOC data available for plotting.";

/// Errors reported by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Annotation target is not part of the geometry
    #[error("The combination order={order} and pixel={pixel} does not exist in the MOC data")]
    InvalidCellReference { order: u8, pixel: u64 },

    /// URL without an http/https scheme
    #[error("Invalid {field} URL '{url}': URL should start with http:// or https://")]
    InvalidUrl { field: &'static str, url: String },

    /// Text source could not be resolved
    #[error("Failed to resolve text source: {0}")]
    FetchFailure(#[from] FetchError),

    /// File to load does not exist
    #[error("File {} not found", .0.display())]
    NotFound(PathBuf),

    /// File is not a valid textual MOC
    #[error("File {} is not a valid textual MOC: {source}", .path.display())]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Operation needs state that is not there yet
    #[error("Missing precondition: {0}")]
    MissingPrecondition(String),

    /// Required collaborator was never configured
    #[error("No {0} configured for this session")]
    CollaboratorUnavailable(&'static str),

    /// Embedding provider failure
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Renderer failure
    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    /// Any other filesystem failure
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// What [`TextualMoc::attach_content`] changed.
///
/// Rejected URLs and fetch failures are not fatal; they are collected in
/// `issues` and the corresponding field keeps its previous value.
#[derive(Debug, Default)]
pub struct AttachOutcome {
    pub text_updated: bool,
    pub multimedia_updated: bool,
    pub image_updated: bool,
    pub issues: Vec<SessionError>,
}

impl AttachOutcome {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Facets shown by [`TextualMoc::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub show_text: bool,
    pub show_area: bool,
    pub show_multimedia: bool,
    pub show_metadata: bool,
    pub show_image: bool,
    pub show_embedding: bool,
    pub plot_embedding: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_text: true,
            show_area: true,
            show_multimedia: true,
            show_metadata: true,
            show_image: true,
            show_embedding: false,
            plot_embedding: false,
        }
    }
}

impl RenderOptions {
    /// Whether any enabled facet has to go through a [`Renderer`].
    pub fn needs_renderer(&self) -> bool {
        self.show_area || self.plot_embedding
    }
}

/// Text produced by [`TextualMoc::render`], one entry per reported facet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub lines: Vec<String>,
}

impl RenderReport {
    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

/// A textual MOC being edited or displayed.
pub struct TextualMoc {
    document: Document,
    coverage: Option<Arc<dyn CoverageMap>>,
    engine: Option<Arc<dyn CoverageMapEngine>>,
    text_fetcher: Option<Arc<dyn TextFetcher>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl TextualMoc {
    /// Start a session, seeding the geometry from `coverage` when given.
    pub fn new(coverage: Option<Arc<dyn CoverageMap>>) -> Self {
        let document = coverage
            .as_ref()
            .map(|map| Document::from_geometry(map.serialize()))
            .unwrap_or_default();

        Self {
            document,
            coverage,
            engine: None,
            text_fetcher: None,
            embedding_provider: None,
            renderer: None,
        }
    }

    /// Start a session around an existing document, with no coverage map.
    pub fn from_document(document: Document) -> Self {
        let mut session = Self::new(None);
        session.document = document;
        session
    }

    pub fn with_engine(mut self, engine: Arc<dyn CoverageMapEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_text_fetcher(mut self, fetcher: Arc<dyn TextFetcher>) -> Self {
        self.text_fetcher = Some(fetcher);
        self
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn coverage(&self) -> Option<&Arc<dyn CoverageMap>> {
        self.coverage.as_ref()
    }

    /// Attach a label to a cell of the geometry, replacing any previous label.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidCellReference` when the cell is not part of
    /// the document's geometry; the document is left untouched.
    pub fn annotate_cell(&mut self, order: u8, pixel: u64, text: impl Into<String>) -> SessionResult<()> {
        if !self.document.contains_cell(order, pixel) {
            return Err(SessionError::InvalidCellReference { order, pixel });
        }

        self.document
            .annotated_cells
            .get_or_insert_with(Default::default)
            .entry(order.to_string())
            .or_default()
            .insert(pixel.to_string(), text.into());
        debug!("Annotated cell order={} pixel={}", order, pixel);
        Ok(())
    }

    /// Drop the label of a cell, returning it.
    ///
    /// Empty per-order maps are pruned, and `annotated_cells` disappears with
    /// its last entry.
    pub fn remove_annotation(&mut self, order: u8, pixel: u64) -> Option<String> {
        let annotations = self.document.annotated_cells.as_mut()?;
        let order_key = order.to_string();
        let pixels = annotations.get_mut(&order_key)?;
        let removed = pixels.remove(&pixel.to_string())?;

        if pixels.is_empty() {
            annotations.remove(&order_key);
        }
        if annotations.is_empty() {
            self.document.annotated_cells = None;
        }
        Some(removed)
    }

    /// Set the custom text from a URL, file or literal, and the media links.
    ///
    /// The three fields are updated independently: a fetch failure leaves
    /// `custom_text` alone but valid links are still applied, and a rejected
    /// link does not prevent the text update.
    ///
    /// # Errors
    /// Returns `SessionError::CollaboratorUnavailable` if no text fetcher is
    /// configured. All other problems are reported in the outcome.
    pub async fn attach_content(
        &mut self,
        text_source: &str,
        multimedia_url: Option<&str>,
        image_url: Option<&str>,
    ) -> SessionResult<AttachOutcome> {
        let fetcher = Self::require(&self.text_fetcher, "text fetcher")?;
        let mut outcome = AttachOutcome::default();

        match fetcher.fetch_text(text_source).await {
            Ok(text) => {
                self.document.custom_text = Some(text.trim().to_string());
                outcome.text_updated = true;
            }
            Err(e) => {
                warn!("Could not resolve text source via {}: {}", fetcher.name(), e);
                outcome.issues.push(SessionError::FetchFailure(e));
            }
        }

        if let Some(url) = multimedia_url {
            match checked_url("multimedia", url) {
                Ok(url) => {
                    self.document.multimedia = Some(url);
                    outcome.multimedia_updated = true;
                }
                Err(e) => outcome.issues.push(e),
            }
        }

        if let Some(url) = image_url {
            match checked_url("image", url) {
                Ok(url) => {
                    self.document.hips2fits_image = Some(url);
                    outcome.image_updated = true;
                }
                Err(e) => outcome.issues.push(e),
            }
        }

        Ok(outcome)
    }

    /// Append a line to the custom text and stamp `last_text_update`.
    pub fn append_text(&mut self, new_text: &str) {
        match &mut self.document.custom_text {
            Some(text) => {
                text.push('\n');
                text.push_str(new_text);
            }
            None => self.document.custom_text = Some(new_text.to_string()),
        }
        self.document.last_text_update = Some(Local::now().format(TIMESTAMP_FORMAT).to_string());
    }

    /// Update authorship metadata.
    ///
    /// `author` is only written when given and non-empty. `date` is always
    /// written: the given value, or today's date when absent or empty.
    pub fn update_metadata(&mut self, author: Option<&str>, date: Option<&str>) {
        if let Some(author) = author.filter(|a| !a.is_empty()) {
            self.document.author = Some(author.to_string());
        }
        let date = match date.filter(|d| !d.is_empty()) {
            Some(date) => date.to_string(),
            None => Local::now().format(DATE_FORMAT).to_string(),
        };
        self.document.date = Some(date);
    }

    /// Embed the custom text with `model_name` and store the vector.
    ///
    /// # Errors
    /// - `CollaboratorUnavailable` if no embedding provider is configured
    /// - `MissingPrecondition` if the document has no custom text
    /// - `Embedding` if the provider fails
    ///
    /// The document is unchanged on every error path.
    pub async fn generate_embedding(&mut self, model_name: &str) -> SessionResult<()> {
        let provider = Self::require(&self.embedding_provider, "embedding provider")?;

        let Some(text) = self.document.custom_text.as_deref() else {
            warn!("No 'custom_text' found in MOC data");
            return Err(SessionError::MissingPrecondition(
                "no custom_text to embed".to_string(),
            ));
        };

        let vector = provider.embed(text, model_name).await?;
        info!(
            "Embedding added using {} model {} (dimension {})",
            provider.name(),
            model_name,
            vector.len()
        );
        self.document.embedding = Some(vector);
        self.document.embedding_model = Some(model_name.to_string());
        Ok(())
    }

    /// Write the document as pretty-printed UTF-8 JSON, replacing the file.
    pub fn save(&self, path: impl AsRef<Path>) -> SessionResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.document).map_err(|e| SessionError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        fs::write(path, json).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Data successfully saved to {}", path.display());
        Ok(())
    }

    /// Replace the document with the contents of a JSON file.
    ///
    /// When an engine is configured the coverage map is rebuilt from the loaded
    /// geometry. A document without geometry keys, a failed rebuild or a missing
    /// engine all leave the session without a coverage map.
    ///
    /// # Errors
    /// `NotFound`, `InvalidFormat` or `Io`; the previous document and coverage
    /// map are kept in every case.
    pub fn load(&mut self, path: impl AsRef<Path>) -> SessionResult<()> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SessionError::NotFound(path.to_path_buf()),
            _ => SessionError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let document: Document =
            serde_json::from_str(&raw).map_err(|source| SessionError::InvalidFormat {
                path: path.to_path_buf(),
                source,
            })?;

        let coverage = match &self.engine {
            Some(engine) if document.has_geometry() => match engine.from_document(&document) {
                Ok(map) => Some(map),
                Err(e) => {
                    warn!("Loaded {} without a coverage map: {}", path.display(), e);
                    None
                }
            },
            _ => None,
        };

        self.document = document;
        self.coverage = coverage;
        info!("Textual MOC loaded from {}", path.display());
        Ok(())
    }

    pub fn show_text(&self) -> String {
        format!(
            "Custom Text: {}",
            self.document.custom_text.as_deref().unwrap_or(NO_TEXT)
        )
    }

    pub fn show_media(&self) -> String {
        format!(
            "Multimedia URL: {}",
            self.document.multimedia.as_deref().unwrap_or(NO_MEDIA)
        )
    }

    pub fn show_image(&self) -> String {
        format!(
            "Image URL: {}",
            self.document.hips2fits_image.as_deref().unwrap_or(NO_IMAGE)
        )
    }

    pub fn show_metadata(&self) -> String {
        format!(
            "Author: {}\nDate: {}\nLast Text Update: {}",
            self.document.author.as_deref().unwrap_or("Unknown"),
            self.document.date.as_deref().unwrap_or("Unknown"),
            self.document.last_text_update.as_deref().unwrap_or("Never updated"),
        )
    }

    pub fn show_embedding(&self) -> String {
        match &self.document.embedding {
            Some(embedding) if !embedding.is_empty() => format!(
                "Embedding Model: {}\nEmbedding Dimension: {}",
                self.document.embedding_model.as_deref().unwrap_or("Unknown"),
                embedding.len()
            ),
            _ => NO_EMBEDDING.to_string(),
        }
    }

    /// Hand the multimedia link to the renderer.
    ///
    /// # Errors
    /// `CollaboratorUnavailable` without a renderer, `MissingPrecondition`
    /// without a link, `Render` if the renderer fails.
    pub fn open_media(&self) -> SessionResult<()> {
        let renderer = Self::require(&self.renderer, "renderer")?;
        let url = self
            .document
            .multimedia
            .as_deref()
            .ok_or_else(|| SessionError::MissingPrecondition(NO_MEDIA.to_string()))?;
        renderer.open_media(url)?;
        Ok(())
    }

    /// Load `path` and present the selected facets.
    ///
    /// Text facets are returned in the report. Graphical facets go through the
    /// renderer; if one of them cannot be drawn a placeholder line is reported
    /// instead and the remaining facets still run.
    ///
    /// # Errors
    /// `CollaboratorUnavailable` when a graphical facet is requested without a
    /// renderer (checked before loading), or any error from [`Self::load`].
    pub fn render(&mut self, path: impl AsRef<Path>, options: &RenderOptions) -> SessionResult<RenderReport> {
        let renderer = if options.needs_renderer() {
            Some(Self::require(&self.renderer, "renderer")?)
        } else {
            None
        };

        self.load(path)?;

        let mut report = RenderReport::default();
        if options.show_text {
            report.push(self.show_text());
        }
        if options.show_image {
            report.push(self.show_image());
        }
        if options.show_multimedia {
            report.push(self.show_media());
        }
        if options.show_metadata {
            report.push(self.show_metadata());
        }
        if options.show_embedding {
            report.push(self.show_embedding());
        }

        if let Some(renderer) = renderer.as_deref() {
            if options.plot_embedding {
                if let Some(placeholder) = self.plot_embedding_with(renderer) {
                    report.push(placeholder);
                }
            }
            if options.show_area {
                if let Some(placeholder) = self.render_area_with(renderer) {
                    report.push(placeholder);
                }
            }
        }

        Ok(report)
    }

    fn plot_embedding_with(&self, renderer: &dyn Renderer) -> Option<String> {
        let embedding = match &self.document.embedding {
            Some(embedding) if !embedding.is_empty() => embedding,
            _ => return Some(NO_EMBEDDING_PLOT.to_string()),
        };
        renderer
            .plot_embedding(embedding, self.document.embedding_model.as_deref())
            .err()
            .map(|e| {
                warn!("Embedding plot failed: {}", e);
                format!("{} ({})", NO_EMBEDDING_PLOT, e)
            })
    }

    fn render_area_with(&self, renderer: &dyn Renderer) -> Option<String> {
        let Some(coverage) = &self.coverage else {
            return Some(NO_AREA.to_string());
        };
        renderer
            .render_area(&self.document, coverage.as_ref())
            .err()
            .map(|e| {
                warn!("Area rendering failed: {}", e);
                format!("{} ({})", NO_AREA, e)
            })
    }

    fn require<T: ?Sized>(slot: &Option<Arc<T>>, what: &'static str) -> SessionResult<Arc<T>> {
        slot.clone().ok_or_else(|| {
            error!("Operation requires a {} but none was configured", what);
            SessionError::CollaboratorUnavailable(what)
        })
    }
}

fn checked_url(field: &'static str, url: &str) -> SessionResult<String> {
    if is_http_url(url) {
        Ok(url.to_string())
    } else {
        warn!("Invalid {} URL provided: '{}'", field, url);
        Err(SessionError::InvalidUrl {
            field,
            url: url.to_string(),
        })
    }
}
