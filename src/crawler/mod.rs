//! # Proceedings Crawler Module
//!
//! This module harvests a conference publication site. It discovers the
//! yearly index pages, enumerates the paper-detail pages of each year,
//! extracts title, authors and abstract from every paper, and downloads the
//! linked PDFs.
//!
//! ## Key Components
//!
//! - `HarvestConfig`: Site, years, per-year cap, concurrency ceilings and output roots
//! - `Fetcher`: Single-shot HTTP GET with timeout and identifying user agent
//! - `extract_links` and its year, paper and PDF instantiations
//! - `extract_metadata`: Label-then-sibling metadata extraction with sentinels
//! - `Downloader`: Chunked streaming of PDFs to disk
//! - `ResultSink`: Per-year metadata CSV and deterministic PDF paths
//! - `Scheduler`: Bounded fan-out over years, papers and PDFs
//!
//! ## Failure isolation
//!
//! A failed paper page drops that paper's row. A failed PDF skips that file.
//! Neither aborts sibling work; both are reported in the returned
//! `HarvestReport` and logged.

mod config;
mod downloader;
mod error;
mod fetcher;
mod links;
mod metadata;
mod scheduler;
pub mod sink;

pub use config::{DEFAULT_BASE_URL, HarvestConfig, HarvestConfigBuilder, YearRange};
pub use downloader::{CHUNK_SIZE, Downloader};
pub use error::{CrawlError, DownloadCause, DownloadError, FetchCause, FetchError};
pub use fetcher::Fetcher;
pub use links::{
    extract_links, is_paper_link, is_pdf_link, is_year_link, paper_links, pdf_links, year_links,
};
pub use metadata::{extract_metadata, replace_illegal_chars};
pub use scheduler::{DownloadOutcome, HarvestEvent, HarvestReport, Scheduler, YearReport};
pub use sink::{ResultSink, sanitize_name};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Title used when a paper page has no title heading
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Authors used when the "Authors" heading or its paragraph is missing
pub const UNKNOWN_AUTHORS: &str = "Unknown Authors";

/// Abstract used when the "Abstract" heading or its paragraph is missing
pub const NO_ABSTRACT: &str = "No Abstract Found";

/// Level of the crawl hierarchy a link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    /// Year index page
    Year,
    /// Paper-detail page
    Paper,
    /// PDF artifact
    Pdf,
}

/// A discovered link to crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    /// Absolute URL of the target
    pub url: Url,

    /// Level of the hierarchy
    pub kind: TargetKind,

    /// Anchor text of the link, trimmed
    pub label: String,
}

impl CrawlTarget {
    /// Year encoded in a year index URL, `/paper_files/paper/<year>`
    pub fn year(&self) -> Option<u16> {
        self.url
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .nth(2)?
            .parse()
            .ok()
    }
}

/// Fields extracted from a paper-detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperMetadata {
    pub title: String,
    pub authors: String,
    pub abstract_text: String,
}

/// One row of harvested metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Position in completion order within the year, starting at 1
    #[serde(rename = "Sr. No")]
    pub sequence_number: usize,

    #[serde(rename = "Year")]
    pub year: u16,

    #[serde(rename = "Title")]
    pub title: String,

    #[serde(rename = "Authors")]
    pub authors: String,

    #[serde(rename = "Abstract")]
    pub abstract_text: String,

    /// Primary PDF of the paper, if the page links one
    #[serde(rename = "PDF Link")]
    pub pdf_url: Option<String>,
}

impl PaperRecord {
    pub fn new(
        sequence_number: usize,
        year: u16,
        metadata: PaperMetadata,
        pdf_url: Option<String>,
    ) -> Self {
        Self {
            sequence_number,
            year,
            title: metadata.title,
            authors: metadata.authors,
            abstract_text: metadata.abstract_text,
            pdf_url,
        }
    }
}

/// A PDF to be written to a fixed destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub pdf_url: Url,
    pub destination: PathBuf,
}

/// Bounds on the work admitted for one year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearScope {
    pub year: u16,

    /// Maximum number of papers scraped, `None` for all
    pub paper_cap: Option<usize>,
}

impl YearScope {
    /// Whether another paper may be admitted given the scraped and in-flight counts
    pub fn admits(&self, scraped: usize, in_flight: usize) -> bool {
        self.paper_cap.is_none_or(|cap| scraped + in_flight < cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_from_target() {
        let target = CrawlTarget {
            url: Url::parse("https://papers.nips.cc/paper_files/paper/2021").unwrap(),
            kind: TargetKind::Year,
            label: "NeurIPS 2021".to_string(),
        };
        assert_eq!(target.year(), Some(2021));

        let target = CrawlTarget {
            url: Url::parse("https://papers.nips.cc/paper_files/paper/2021/").unwrap(),
            ..target
        };
        assert_eq!(target.year(), Some(2021));

        let target = CrawlTarget {
            url: Url::parse("https://papers.nips.cc/paper_files/paper/latest").unwrap(),
            ..target
        };
        assert_eq!(target.year(), None);
    }

    #[test]
    fn test_year_scope_admission() {
        let capped = YearScope {
            year: 2023,
            paper_cap: Some(2),
        };
        assert!(capped.admits(0, 1));
        assert!(capped.admits(1, 0));
        assert!(!capped.admits(1, 1));
        assert!(!capped.admits(2, 0));

        let zero = YearScope {
            year: 2023,
            paper_cap: Some(0),
        };
        assert!(!zero.admits(0, 0));

        let open = YearScope {
            year: 2023,
            paper_cap: None,
        };
        assert!(open.admits(10_000, 64));
    }

    #[test]
    fn test_paper_record_from_metadata() {
        let metadata = PaperMetadata {
            title: "Attention".to_string(),
            authors: "A. Author".to_string(),
            abstract_text: NO_ABSTRACT.to_string(),
        };
        let record = PaperRecord::new(3, 2023, metadata, None);

        assert_eq!(record.sequence_number, 3);
        assert_eq!(record.title, "Attention");
        assert_eq!(record.abstract_text, NO_ABSTRACT);
        assert!(record.pdf_url.is_none());
    }
}
