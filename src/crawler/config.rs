//! # Harvest Configuration Module
//!
//! This module provides the static configuration for a harvest run: which
//! site and years to crawl, how many papers to take per year, the concurrency
//! ceiling of each fan-out level, and where results are written. It uses a
//! builder pattern for flexible configuration.
//!
//! ## Key Components
//!
//! - `HarvestConfig`: The main configuration struct with harvest parameters
//! - `HarvestConfigBuilder`: Builder pattern implementation for easier configuration
//! - `YearRange`: Inclusive range of conference years
//!
//! The concurrency ceilings are the binding operational constraint: the target
//! site's acceptable request rate decides them, so they live here rather than
//! at call sites.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use super::YearScope;
use super::error::CrawlError;

/// Default site root
pub const DEFAULT_BASE_URL: &str = "https://papers.nips.cc/";

/// Path prefix shared by year index pages and paper-detail pages
pub const PAPER_FILES_PREFIX: &str = "/paper_files/paper/";

/// Inclusive range of conference years, walked newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    start: u16,
    end: u16,
}

impl YearRange {
    /// Create a range; the bounds are swapped if given in reverse
    pub fn new(start: u16, end: u16) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// A range covering a single year
    pub fn single(year: u16) -> Self {
        Self::new(year, year)
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn contains(&self, year: u16) -> bool {
        (self.start..=self.end).contains(&year)
    }

    /// Number of years in the range
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Years from newest to oldest
    pub fn iter(self) -> impl Iterator<Item = u16> {
        (self.start..=self.end).rev()
    }
}

/// Configuration for a harvest run
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root of the publication site
    pub base_url: Url,

    /// Years to harvest
    pub years: YearRange,

    /// Maximum number of papers scraped per year, `None` for all
    pub paper_cap: Option<usize>,

    /// Maximum number of years processed at once
    pub year_concurrency: usize,

    /// Maximum number of paper pages in flight per year
    pub paper_concurrency: usize,

    /// Maximum number of PDF downloads in flight per paper
    pub pdf_concurrency: usize,

    /// Optional ceiling on requests per second across the whole run
    pub requests_per_second: Option<NonZeroU32>,

    /// Timeout applied to every request
    pub request_timeout: Duration,

    /// User agent to use for requests
    pub user_agent: String,

    /// Directory receiving one metadata CSV per year
    pub metadata_root: PathBuf,

    /// Directory receiving one subdirectory of PDFs per year
    pub results_root: PathBuf,

    /// Prefix of the metadata file names, `<prefix>_<year>.csv`
    pub site_prefix: String,

    /// Whether PDF links are downloaded at all
    pub download_pdfs: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        let years = YearRange::single(2023);
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL must parse"),
            years,
            paper_cap: Some(5),
            year_concurrency: years.len(),
            paper_concurrency: 64,
            pdf_concurrency: 4,
            requests_per_second: None,
            request_timeout: Duration::from_secs(10),
            user_agent: format!(
                "Mozilla/5.0 (compatible; paperharvest/{})",
                env!("CARGO_PKG_VERSION")
            ),
            metadata_root: PathBuf::from("MetaData_Results"),
            results_root: PathBuf::from("Scrap_Results"),
            site_prefix: "NeurIPS".to_string(),
            download_pdfs: true,
        }
    }
}

/// Builder for HarvestConfig
#[derive(Debug, Default)]
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
    year_concurrency_set: bool,
}

impl HarvestConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the site root
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.config.base_url = base_url;
        self
    }

    /// Parse and set the site root
    pub fn base_url_str(self, base_url: &str) -> Result<Self, CrawlError> {
        let url = Url::parse(base_url)?;
        Ok(self.base_url(url))
    }

    /// Set the years to harvest
    pub fn years(mut self, years: YearRange) -> Self {
        self.config.years = years;
        self
    }

    /// Set the per-year paper cap
    pub fn paper_cap(mut self, paper_cap: Option<usize>) -> Self {
        self.config.paper_cap = paper_cap;
        self
    }

    /// Set the year-level concurrency ceiling
    pub fn year_concurrency(mut self, year_concurrency: usize) -> Self {
        self.config.year_concurrency = year_concurrency;
        self.year_concurrency_set = true;
        self
    }

    /// Set the paper-level concurrency ceiling
    pub fn paper_concurrency(mut self, paper_concurrency: usize) -> Self {
        self.config.paper_concurrency = paper_concurrency;
        self
    }

    /// Set the PDF-level concurrency ceiling
    pub fn pdf_concurrency(mut self, pdf_concurrency: usize) -> Self {
        self.config.pdf_concurrency = pdf_concurrency;
        self
    }

    /// Limit the request rate of the whole run
    pub fn requests_per_second(mut self, requests_per_second: Option<NonZeroU32>) -> Self {
        self.config.requests_per_second = requests_per_second;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.request_timeout = request_timeout;
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the metadata output directory
    pub fn metadata_root(mut self, metadata_root: impl Into<PathBuf>) -> Self {
        self.config.metadata_root = metadata_root.into();
        self
    }

    /// Set the PDF output directory
    pub fn results_root(mut self, results_root: impl Into<PathBuf>) -> Self {
        self.config.results_root = results_root.into();
        self
    }

    /// Set the metadata file name prefix
    pub fn site_prefix(mut self, site_prefix: impl Into<String>) -> Self {
        self.config.site_prefix = site_prefix.into();
        self
    }

    /// Set whether PDFs are downloaded
    pub fn download_pdfs(mut self, download_pdfs: bool) -> Self {
        self.config.download_pdfs = download_pdfs;
        self
    }

    /// Build the configuration
    pub fn build(self) -> HarvestConfig {
        let mut config = self.config;
        if !self.year_concurrency_set {
            config.year_concurrency = config.years.len();
        }
        config.year_concurrency = config.year_concurrency.max(1);
        config.paper_concurrency = config.paper_concurrency.max(1);
        config.pdf_concurrency = config.pdf_concurrency.max(1);
        config
    }
}

impl HarvestConfig {
    /// Create a new builder
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder::new()
    }

    /// Scope of work for one year
    pub fn year_scope(&self, year: u16) -> YearScope {
        YearScope {
            year,
            paper_cap: self.paper_cap,
        }
    }

    /// Conventional index URL of a year, used when the site index does not list it
    pub fn year_url(&self, year: u16) -> Result<Url, CrawlError> {
        let path = format!("{}{}", PAPER_FILES_PREFIX.trim_start_matches('/'), year);
        Ok(self.base_url.join(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_range_normalises_and_walks_newest_first() {
        let range = YearRange::new(2023, 2021);
        assert_eq!(range.start(), 2021);
        assert_eq!(range.end(), 2023);
        assert_eq!(range.len(), 3);
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![2023, 2022, 2021]);
        assert!(range.contains(2022));
        assert!(!range.contains(2020));
    }

    #[test]
    fn test_builder_defaults_year_concurrency_to_range_len() {
        let config = HarvestConfig::builder()
            .years(YearRange::new(2019, 2023))
            .paper_concurrency(0)
            .build();

        assert_eq!(config.year_concurrency, 5);
        assert_eq!(config.paper_concurrency, 1);
        assert_eq!(config.pdf_concurrency, 4);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_explicit_values() {
        let config = HarvestConfig::builder()
            .base_url_str("http://localhost:8080/")
            .unwrap()
            .paper_cap(None)
            .year_concurrency(2)
            .site_prefix("ICML")
            .download_pdfs(false)
            .build();

        assert_eq!(config.base_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.paper_cap, None);
        assert_eq!(config.year_concurrency, 2);
        assert_eq!(config.site_prefix, "ICML");
        assert!(!config.download_pdfs);
    }

    #[test]
    fn test_year_url() {
        let config = HarvestConfig::default();
        assert_eq!(
            config.year_url(2022).unwrap().as_str(),
            "https://papers.nips.cc/paper_files/paper/2022"
        );
        assert_eq!(config.year_scope(2022).paper_cap, Some(5));
    }
}
