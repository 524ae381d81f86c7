//! Text source resolution.
//!
//! A text source is a single string that may be an http(s) URL, the path of a
//! local file, or the literal text itself. [`TextFetcher`] turns it into plain
//! text; [`HttpTextFetcher`] is the reqwest-backed implementation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use scraper::Html;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while resolving a text source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or transport failure
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("HTTP {status} returned by {url}")]
    Status { url: String, status: u16 },

    /// Local file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body could not be decoded as text
    #[error("Decode error: {0}")]
    Decode(String),

    /// Client could not be configured
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// How a text source string will be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource<'a> {
    /// http:// or https:// URL, fetched and stripped of HTML
    Url(&'a str),
    /// Existing local file, read as UTF-8
    File(&'a Path),
    /// Anything else is used as-is
    Literal(&'a str),
}

impl<'a> TextSource<'a> {
    /// Classify a source string. URLs win over file paths.
    pub fn classify(source: &'a str) -> Self {
        if is_http_url(source) {
            TextSource::Url(source)
        } else if Path::new(source).is_file() {
            TextSource::File(Path::new(source))
        } else {
            TextSource::Literal(source)
        }
    }
}

/// Whether the string uses an http or https scheme.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Extract the visible text of an HTML document.
pub fn html_to_text(html: &str) -> String {
    Html::parse_document(html).root_element().text().collect()
}

/// Trait for text source resolvers.
#[async_trait]
pub trait TextFetcher: Send + Sync {
    /// Resolve `source` into plain text.
    ///
    /// # Errors
    /// Returns `FetchError` when a URL cannot be fetched or a file cannot be read.
    async fn fetch_text(&self, source: &str) -> FetchResult<String>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// HTTP client settings for [`HttpTextFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("textual-moc/{}", crate::VERSION),
        }
    }
}

/// Resolves URLs over HTTP, files from disk, and passes literals through.
#[derive(Debug, Clone)]
pub struct HttpTextFetcher {
    client: reqwest::Client,
}

impl HttpTextFetcher {
    /// Create a fetcher with the given client settings.
    ///
    /// # Errors
    /// Returns `FetchError::ConfigError` if the HTTP client cannot be built
    pub fn new(config: FetchConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| FetchError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn fetch_url(&self, url: &str) -> FetchResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(html_to_text(&body))
    }
}

#[async_trait]
impl TextFetcher for HttpTextFetcher {
    async fn fetch_text(&self, source: &str) -> FetchResult<String> {
        match TextSource::classify(source) {
            TextSource::Url(url) => {
                debug!("Fetching text from {}", url);
                self.fetch_url(url).await
            }
            TextSource::File(path) => {
                debug!("Reading text from {:?}", path);
                Ok(tokio::fs::read_to_string(path).await?)
            }
            TextSource::Literal(text) => Ok(text.to_string()),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;
    use std::io::Write;

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("http://example.com"));
        assert!(is_http_url("https://example.com/page"));
        assert!(!is_http_url("ftp://bad"));
        assert!(!is_http_url("HTTP://upper.case"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            TextSource::classify("https://example.com"),
            TextSource::Url("https://example.com")
        );
        assert_eq!(
            TextSource::classify("just some words"),
            TextSource::Literal("just some words")
        );

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(matches!(TextSource::classify(&path), TextSource::File(_)));
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><title>M31</title></head>\
                    <body><h1>Andromeda</h1><p>A <b>spiral</b> galaxy.</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Andromeda"));
        assert!(text.contains("A spiral galaxy."));
        assert!(!text.contains('<'));
    }

    #[tokio::test]
    async fn test_fetch_literal_and_file() {
        let fetcher = HttpTextFetcher::new(FetchConfig::default()).unwrap();

        let literal = fetcher.fetch_text("  Hello MOC!  ").await.unwrap();
        assert_eq!(literal, "  Hello MOC!  ");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\nNotes about the region\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let from_file = fetcher.fetch_text(&path).await.unwrap();
        assert_eq!(from_file, "\nNotes about the region\n");
    }

    #[tokio::test]
    async fn test_fetch_url_strips_html() {
        let (base, server) = serve_once(
            "200 OK",
            "text/html; charset=utf-8",
            "<html><body><h1>Crab Nebula</h1><p>Supernova <i>remnant</i>.</p></body></html>",
        )
        .await;
        let fetcher = HttpTextFetcher::new(FetchConfig::default()).unwrap();

        let text = fetcher.fetch_text(&format!("{}/m1", base)).await.unwrap();
        assert!(text.contains("Crab Nebula"));
        assert!(text.contains("Supernova remnant."));
        assert!(!text.contains("<p>"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /m1 HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("user-agent: textual-moc/"));
    }

    #[tokio::test]
    async fn test_fetch_url_error_status() {
        let (base, server) = serve_once("404 Not Found", "text/plain", "missing").await;
        let fetcher = HttpTextFetcher::new(FetchConfig::default()).unwrap();

        let url = format!("{}/gone", base);
        let result = fetcher.fetch_text(&url).await;
        match result {
            Err(FetchError::Status { url: failed, status }) => {
                assert_eq!(failed, url);
                assert_eq!(status, 404);
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.user_agent.starts_with("textual-moc/"));
    }
}
