//! Error types for the paperharvest crate

use thiserror::Error;

/// Result type for paperharvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for paperharvest operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Crawl pipeline error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Annotation pass error
    #[error("Annotate error: {0}")]
    Annotate(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
