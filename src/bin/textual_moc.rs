//! Command-line entry point for editing and viewing textual MOC files.
//!
//! Every editing subcommand loads the JSON file, applies one session
//! operation and writes the file back.
//!
//! # Examples
//!
//! Create a textual MOC from a MOC JSON file:
//! ```bash
//! textual-moc init orion.json --moc orion_moc.json
//! ```
//!
//! Label a cell and attach content:
//! ```bash
//! textual-moc annotate orion.json --order 3 --pixel 120 --text "Bright knot"
//! textual-moc attach orion.json --text https://example.com/notes --multimedia https://example.com/video
//! ```
//!
//! Embed the custom text with a local model and show everything:
//! ```bash
//! textual-moc embed orion.json --backend fast-embed
//! textual-moc render orion.json --show-embedding --plot-embedding
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use textual_moc::{
    embedding::{fastembed::FastEmbedProvider, ollama::OllamaEmbedding, EmbeddingProvider},
    fetch::{FetchConfig, HttpTextFetcher},
    render::ConsoleRenderer,
    HealpixMoc, JsonMocEngine, RenderOptions, TextualMoc, DEFAULT_EMBEDDING_MODEL,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Embedding backend type
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingBackend {
    /// Ollama server (default, honours OLLAMA_HOST)
    Ollama,
    /// FastEmbed local models, downloaded on first use
    FastEmbed,
}

/// Annotate sky coverage maps with text, media links and embeddings
#[derive(Parser, Debug)]
#[command(
    name = "textual-moc",
    version,
    about = "Create, edit and display textual MOC files",
    long_about = "Attach custom text, cell labels, multimedia and image links, authorship \
                  metadata and text embeddings to a Multi-Order Coverage map.

EXAMPLES:
  Start from a MOC:
    textual-moc init orion.json --moc orion_moc.json

  Label a cell:
    textual-moc annotate orion.json --order 3 --pixel 120 --text \"Bright knot\"

  Embed with a remote Ollama server:
    OLLAMA_HOST=http://gpu-box:11434 textual-moc embed orion.json

  Show everything:
    textual-moc render orion.json --show-embedding --plot-embedding"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Logging verbosity level
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new textual MOC file
    Init {
        /// Output file
        file: PathBuf,

        /// MOC JSON file providing the geometry (empty geometry if omitted)
        #[arg(long, value_name = "FILE")]
        moc: Option<PathBuf>,
    },

    /// Label a cell of the geometry
    Annotate {
        file: PathBuf,

        #[command(flatten)]
        cell: CellArgs,

        /// Label text
        #[arg(long)]
        text: String,
    },

    /// Remove the label of a cell
    Unannotate {
        file: PathBuf,

        #[command(flatten)]
        cell: CellArgs,
    },

    /// Set the custom text and media links
    Attach {
        file: PathBuf,

        /// URL, file path or literal text
        #[arg(long, value_name = "SOURCE")]
        text: String,

        /// Multimedia link (http or https)
        #[arg(long, value_name = "URL")]
        multimedia: Option<String>,

        /// hips2fits image link (http or https)
        #[arg(long, value_name = "URL")]
        image: Option<String>,

        /// HTTP timeout when the text source is a URL
        #[arg(long, value_name = "SECS", default_value = "30")]
        timeout_secs: u64,
    },

    /// Append a line to the custom text
    Append {
        file: PathBuf,

        /// Text to append
        text: String,
    },

    /// Set author and date (date defaults to today)
    Metadata {
        file: PathBuf,

        #[arg(long)]
        author: Option<String>,

        /// Date in YYYY-MM-DD form
        #[arg(long)]
        date: Option<String>,
    },

    /// Embed the custom text
    Embed {
        file: PathBuf,

        #[command(flatten)]
        embedding: EmbeddingArgs,
    },

    /// Display a textual MOC file
    Render {
        file: PathBuf,

        #[command(flatten)]
        facets: FacetArgs,

        /// Also present the multimedia link
        #[arg(long)]
        open_media: bool,
    },
}

#[derive(Args, Debug)]
struct CellArgs {
    /// HEALPix order (depth)
    #[arg(long)]
    order: u8,

    /// Pixel index at that order
    #[arg(long)]
    pixel: u64,
}

#[derive(Args, Debug)]
struct EmbeddingArgs {
    /// Embedding backend to use
    #[arg(long, value_enum, default_value = "ollama")]
    backend: EmbeddingBackend,

    /// Embedding model name
    #[arg(long, value_name = "MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    model: String,

    /// Ollama server address
    #[arg(long, value_name = "URL", env = "OLLAMA_HOST")]
    ollama_url: Option<String>,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FacetArgs {
    #[arg(long)]
    no_text: bool,

    #[arg(long)]
    no_area: bool,

    #[arg(long)]
    no_multimedia: bool,

    #[arg(long)]
    no_metadata: bool,

    #[arg(long)]
    no_image: bool,

    /// Print the embedding model and dimension
    #[arg(long)]
    show_embedding: bool,

    /// Plot the embedding vector
    #[arg(long)]
    plot_embedding: bool,
}

impl From<&FacetArgs> for RenderOptions {
    fn from(args: &FacetArgs) -> Self {
        Self {
            show_text: !args.no_text,
            show_area: !args.no_area,
            show_multimedia: !args.no_multimedia,
            show_metadata: !args.no_metadata,
            show_image: !args.no_image,
            show_embedding: args.show_embedding,
            plot_embedding: args.plot_embedding,
        }
    }
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Create an embedding provider based on CLI arguments
fn create_embedding_provider(args: &EmbeddingArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    match args.backend {
        EmbeddingBackend::Ollama => {
            let provider = OllamaEmbedding::new(args.ollama_url.clone())
                .context("Failed to initialize Ollama provider")?;
            info!("Using Ollama at {}", provider.base_url());
            Ok(Arc::new(provider))
        }
        EmbeddingBackend::FastEmbed => {
            let cache_dir = args.cache_dir.clone().unwrap_or_else(|| {
                dirs::cache_dir()
                    .map(|p| p.join("fastembed"))
                    .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
            });
            debug!("Using FastEmbed cache directory: {:?}", cache_dir);
            Ok(Arc::new(FastEmbedProvider::new(Some(cache_dir))))
        }
    }
}

/// Spinner shown while waiting on the embedding backend
fn create_spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .context("Invalid spinner template")?,
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    Ok(spinner)
}

/// Open an existing textual MOC file
fn open_session(path: &Path) -> Result<TextualMoc> {
    let mut session = TextualMoc::new(None).with_engine(Arc::new(JsonMocEngine));
    session
        .load(path)
        .with_context(|| format!("Failed to load {:?}", path))?;
    Ok(session)
}

fn save_session(session: &TextualMoc, path: &Path) -> Result<()> {
    session
        .save(path)
        .with_context(|| format!("Failed to save {:?}", path))
}

fn init(file: &Path, moc: Option<&Path>) -> Result<()> {
    let coverage = match moc {
        Some(moc_path) => {
            let raw = std::fs::read_to_string(moc_path)
                .with_context(|| format!("Failed to read MOC file {:?}", moc_path))?;
            let moc = HealpixMoc::from_json_str(&raw)
                .with_context(|| format!("Invalid MOC file {:?}", moc_path))?;
            if moc.is_empty() {
                warn!("MOC file {:?} lists no cells, nothing can be annotated", moc_path);
            } else {
                info!("Loaded MOC with {} cells", moc.cell_count());
            }
            Some(Arc::new(moc) as Arc<dyn textual_moc::CoverageMap>)
        }
        None => {
            warn!("No MOC given, starting with empty geometry");
            None
        }
    };

    save_session(&TextualMoc::new(coverage), file)?;
    println!("Created {}", file.display());
    Ok(())
}

async fn attach(
    file: &Path,
    text: &str,
    multimedia: Option<&str>,
    image: Option<&str>,
    timeout_secs: u64,
) -> Result<()> {
    let fetcher = HttpTextFetcher::new(FetchConfig {
        timeout_secs,
        ..FetchConfig::default()
    })
    .context("Failed to create text fetcher")?;
    let mut session = open_session(file)?.with_text_fetcher(Arc::new(fetcher));

    let outcome = session
        .attach_content(text, multimedia, image)
        .await
        .context("Failed to attach content")?;

    for issue in &outcome.issues {
        println!("Skipped: {}", issue);
    }
    if outcome.text_updated {
        println!("{}", session.show_text());
    }
    if outcome.multimedia_updated {
        println!("{}", session.show_media());
    }
    if outcome.image_updated {
        println!("{}", session.show_image());
    }

    save_session(&session, file)
}

async fn embed(file: &Path, args: &EmbeddingArgs) -> Result<()> {
    let provider = create_embedding_provider(args).context("Failed to create embedding provider")?;
    let mut session = open_session(file)?.with_embedding_provider(provider);

    let spinner = create_spinner(format!("Embedding with {}", args.model))?;
    let result = session.generate_embedding(&args.model).await;
    spinner.finish_and_clear();
    result.context("Failed to generate embedding")?;

    println!("{}", session.show_embedding());
    save_session(&session, file)
}

fn render(file: &Path, facets: &FacetArgs, open_media: bool) -> Result<()> {
    let renderer = Arc::new(ConsoleRenderer::buffered());
    let mut session = TextualMoc::new(None)
        .with_engine(Arc::new(JsonMocEngine))
        .with_renderer(renderer.clone());

    let report = session
        .render(file, &RenderOptions::from(facets))
        .with_context(|| format!("Failed to render {:?}", file))?;
    for line in &report.lines {
        println!("{}", line);
    }

    if open_media {
        if let Err(e) = session.open_media() {
            println!("{}", e);
        }
    }

    print!("{}", renderer.output());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level).context("Failed to initialize logging")?;
    debug!("CLI arguments: {:?}", cli);

    match &cli.command {
        Command::Init { file, moc } => init(file, moc.as_deref()),
        Command::Annotate { file, cell, text } => {
            let mut session = open_session(file)?;
            session
                .annotate_cell(cell.order, cell.pixel, text.as_str())
                .context("Failed to annotate cell")?;
            save_session(&session, file)
        }
        Command::Unannotate { file, cell } => {
            let mut session = open_session(file)?;
            match session.remove_annotation(cell.order, cell.pixel) {
                Some(label) => println!("Removed label '{}'", label),
                None => println!(
                    "No label on order={} pixel={}",
                    cell.order, cell.pixel
                ),
            }
            save_session(&session, file)
        }
        Command::Attach {
            file,
            text,
            multimedia,
            image,
            timeout_secs,
        } => {
            attach(
                file,
                text,
                multimedia.as_deref(),
                image.as_deref(),
                *timeout_secs,
            )
            .await
        }
        Command::Append { file, text } => {
            let mut session = open_session(file)?;
            session.append_text(text);
            println!("{}", session.show_text());
            save_session(&session, file)
        }
        Command::Metadata { file, author, date } => {
            let mut session = open_session(file)?;
            session.update_metadata(author.as_deref(), date.as_deref());
            println!("{}", session.show_metadata());
            save_session(&session, file)
        }
        Command::Embed { file, embedding } => embed(file, embedding).await,
        Command::Render {
            file,
            facets,
            open_media,
        } => render(file, facets, *open_media),
    }
}
