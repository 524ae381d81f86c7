//! Presentation of textual MOCs.
//!
//! [`Renderer`] is the seam for anything that draws: the covered area with its
//! cell labels, the embedding, and the "open media" action of an interactive
//! viewer. [`ConsoleRenderer`] draws tables into any writer.

use std::io::{self, Write};
use std::sync::Mutex;

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table};
use thiserror::Error;

use crate::coverage::CoverageMap;
use crate::models::Document;

/// Pixel ids listed per order before the table abbreviates.
const PIXEL_PREVIEW: usize = 8;

/// Width of the embedding sparkline.
const PLOT_WIDTH: usize = 64;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Errors that can occur while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Output sink failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The renderer cannot present this facet
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Other unexpected errors
    #[error("Render error: {0}")]
    Other(String),
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Trait for presentation backends.
pub trait Renderer: Send + Sync {
    /// Draw the covered region and any per-cell labels.
    fn render_area(&self, document: &Document, coverage: &dyn CoverageMap) -> RenderResult<()>;

    /// Draw an embedding vector.
    fn plot_embedding(&self, embedding: &[f64], model: Option<&str>) -> RenderResult<()>;

    /// Present the multimedia link so the user can open it.
    fn open_media(&self, url: &str) -> RenderResult<()>;
}

/// Summary statistics of an embedding vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingSummary {
    pub dimension: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub norm: f64,
}

impl EmbeddingSummary {
    /// Summarize a vector; `None` when it is empty.
    pub fn of(embedding: &[f64]) -> Option<Self> {
        if embedding.is_empty() {
            return None;
        }
        let min = embedding.iter().copied().fold(f64::INFINITY, f64::min);
        let max = embedding.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = embedding.iter().sum();
        let norm = embedding.iter().map(|x| x * x).sum::<f64>().sqrt();
        Some(Self {
            dimension: embedding.len(),
            min,
            max,
            mean: sum / embedding.len() as f64,
            norm,
        })
    }
}

/// Render an embedding as a one-line bar chart of bucket means.
pub fn sparkline(embedding: &[f64], width: usize) -> String {
    let Some(summary) = EmbeddingSummary::of(embedding) else {
        return String::new();
    };
    let width = width.clamp(1, embedding.len());
    let chunk = embedding.len().div_ceil(width);
    let range = summary.max - summary.min;

    embedding
        .chunks(chunk)
        .map(|bucket| {
            let mean = bucket.iter().sum::<f64>() / bucket.len() as f64;
            let level = if range > 0.0 {
                ((mean - summary.min) / range * (SPARK_LEVELS.len() - 1) as f64).round() as usize
            } else {
                0
            };
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}

/// Draws tables and text plots into a writer.
pub struct ConsoleRenderer<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleRenderer<Vec<u8>> {
    /// Renderer that keeps its output in memory.
    pub fn buffered() -> Self {
        Self::new(Vec::new())
    }

    /// Everything written so far, lossily decoded.
    pub fn output(&self) -> String {
        match self.out.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl<W: Write + Send> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, text: &str) -> RenderResult<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| RenderError::Other("output lock poisoned".to_string()))?;
        writeln!(out, "{}", text)?;
        out.flush()?;
        Ok(())
    }
}

fn header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).add_attribute(Attribute::Bold))
        .collect()
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

impl<W: Write + Send> Renderer for ConsoleRenderer<W> {
    fn render_area(&self, document: &Document, coverage: &dyn CoverageMap) -> RenderResult<()> {
        let mut cells = new_table();
        cells.set_header(header(&["Order", "Cells", "Pixels", "Annotated"]));

        for order in coverage.orders() {
            let members = coverage.members(order);
            let mut preview: Vec<String> = members
                .iter()
                .take(PIXEL_PREVIEW)
                .map(u64::to_string)
                .collect();
            if members.len() > PIXEL_PREVIEW {
                preview.push("…".to_string());
            }
            let annotated = members
                .iter()
                .filter(|&&pixel| document.annotation(order, pixel).is_some())
                .count();

            cells.add_row(vec![
                Cell::new(order),
                Cell::new(members.len()),
                Cell::new(preview.join(", ")),
                Cell::new(annotated),
            ]);
        }

        let mut output = format!("Visualizing MOC Area\n{}", cells);

        if let Some(annotations) = &document.annotated_cells {
            let mut labels = new_table();
            labels.set_header(header(&["Order", "Pixel", "Label"]));
            for (order, pixels) in annotations {
                for (pixel, label) in pixels {
                    labels.add_row(vec![order.as_str(), pixel.as_str(), label.as_str()]);
                }
            }
            output.push('\n');
            output.push_str(&labels.to_string());
        }

        self.emit(&output)
    }

    fn plot_embedding(&self, embedding: &[f64], model: Option<&str>) -> RenderResult<()> {
        let summary = EmbeddingSummary::of(embedding)
            .ok_or_else(|| RenderError::Unsupported("empty embedding".to_string()))?;

        let mut table = new_table();
        table.set_header(header(&["Model", "Dimension", "Min", "Max", "Mean", "Norm"]));
        table.add_row(vec![
            Cell::new(model.unwrap_or("unknown")),
            Cell::new(summary.dimension),
            Cell::new(format!("{:.4}", summary.min)),
            Cell::new(format!("{:.4}", summary.max)),
            Cell::new(format!("{:.4}", summary.mean)),
            Cell::new(format!("{:.4}", summary.norm)),
        ]);

        self.emit(&format!("{}\n{}", table, sparkline(embedding, PLOT_WIDTH)))
    }

    fn open_media(&self, url: &str) -> RenderResult<()> {
        self.emit(&format!("Open Media: {}", url))
    }
}
