//! Error types for the crawler module

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error as CrateError;
use reqwest::StatusCode;
use thiserror::Error;

/// Why a request did not yield a usable body
#[derive(Debug, Error)]
pub enum FetchCause {
    /// Network, timeout or body decoding failure
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("unexpected status {0}")]
    Status(StatusCode),

    /// Nothing arrived from the server for this long
    #[error("no data received for {0:?}")]
    TimedOut(Duration),
}

/// A page could not be fetched
#[derive(Debug, Error)]
#[error("failed to fetch {url}: {cause}")]
pub struct FetchError {
    /// URL that was requested
    pub url: String,

    /// Underlying cause
    #[source]
    pub cause: FetchCause,
}

impl FetchError {
    pub(crate) fn new(url: impl Into<String>, cause: impl Into<FetchCause>) -> Self {
        Self {
            url: url.into(),
            cause: cause.into(),
        }
    }

    /// HTTP status returned by the server, if the failure was a status failure
    pub fn status(&self) -> Option<StatusCode> {
        match &self.cause {
            FetchCause::Status(status) => Some(*status),
            FetchCause::Http(e) => e.status(),
            FetchCause::TimedOut(_) => None,
        }
    }
}

/// Why a PDF did not land on disk
#[derive(Debug, Error)]
pub enum DownloadCause {
    /// Request or body stream failure
    #[error("{0}")]
    Fetch(#[from] FetchCause),

    /// Writing the destination file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A PDF download failed
#[derive(Debug, Error)]
#[error("failed to download {url} to {}: {cause}", path.display())]
pub struct DownloadError {
    /// URL of the PDF
    pub url: String,

    /// Destination that was being written
    pub path: PathBuf,

    /// Underlying cause
    #[source]
    pub cause: DownloadCause,
}

impl DownloadError {
    pub(crate) fn new(
        url: impl Into<String>,
        path: impl Into<PathBuf>,
        cause: impl Into<DownloadCause>,
    ) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            cause: cause.into(),
        }
    }
}

impl From<FetchError> for DownloadCause {
    fn from(err: FetchError) -> Self {
        DownloadCause::Fetch(err.cause)
    }
}

/// Error type for crawler operations that are not contained per unit of work
#[derive(Debug, Error)]
pub enum CrawlError {
    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Metadata sink IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata sink CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error during task joining
    #[error("Task join error: {0}")]
    TaskJoin(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<tokio::task::JoinError> for CrawlError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(format!("Failed to join task: {}", err))
    }
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Http(e) => CrateError::Http(e),
            CrawlError::UrlParse(e) => CrateError::Url(e),
            CrawlError::Io(e) => CrateError::Io(e),
            CrawlError::Csv(e) => CrateError::Csv(e),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}

impl From<FetchError> for CrateError {
    fn from(err: FetchError) -> Self {
        CrateError::Crawl(err.to_string())
    }
}

impl From<DownloadError> for CrateError {
    fn from(err: DownloadError) -> Self {
        CrateError::Crawl(err.to_string())
    }
}
