//! Bounded fan-out over years, papers and PDFs
//!
//! Each level has its own ceiling from `HarvestConfig`: a semaphore gates
//! the years of a run, a semaphore of paper slots gates the papers of a year,
//! and each paper streams at most `pdf_concurrency` PDFs at once. A paper keeps
//! its slot until its downloads finish, so a year never has more than
//! `paper_concurrency * pdf_concurrency` PDFs in flight.
//!
//! Paper admission is also bounded by the year's cap. A paper is admitted only
//! while `scraped + in_flight < cap`, so a failed page frees its slot for the
//! next link and a successful run never requests more pages than it needs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::crawler::error::{CrawlError, DownloadError, FetchError};
use crate::crawler::links::{paper_links, pdf_links, year_links};
use crate::crawler::metadata::extract_metadata;
use crate::crawler::sink::DestinationRegistry;
use crate::crawler::{
    CrawlTarget, DownloadJob, Downloader, Fetcher, HarvestConfig, PaperMetadata, PaperRecord,
    ResultSink, YearScope,
};

/// Progress notification fed to an optional status channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    YearStarted { year: u16, papers: usize },
    PaperScraped { year: u16, sequence_number: usize, title: String },
    PaperFailed { year: u16, url: String, reason: String },
    PdfDownloaded { year: u16, path: PathBuf, bytes: u64 },
    PdfFailed { year: u16, url: String, reason: String },
    YearFinished { year: u16, records: usize },
}

/// Result of one download job
#[derive(Debug)]
pub struct DownloadOutcome {
    pub job: DownloadJob,

    /// Bytes written, or why the file is missing or partial
    pub result: Result<u64, DownloadError>,
}

/// What a single year contributed to the run
#[derive(Debug)]
pub struct YearReport {
    pub year: u16,

    /// Rows in completion order
    pub records: Vec<PaperRecord>,

    /// Download results in completion order
    pub downloads: Vec<DownloadOutcome>,

    /// Paper pages that could not be fetched
    pub failures: Vec<FetchError>,

    /// Paper links never requested because the cap was reached
    pub skipped: usize,

    /// Failure fetching the year index page; no rows are written in that case
    pub index_error: Option<FetchError>,

    /// Failure persisting the rows or preparing the PDF directory
    pub sink_error: Option<CrawlError>,

    /// Metadata file written for the year
    pub metadata_path: Option<PathBuf>,

    /// Paper or download tasks that panicked or were cancelled
    pub lost: Vec<String>,
}

impl YearReport {
    fn new(year: u16) -> Self {
        Self {
            year,
            records: Vec::new(),
            downloads: Vec::new(),
            failures: Vec::new(),
            skipped: 0,
            index_error: None,
            sink_error: None,
            metadata_path: None,
            lost: Vec::new(),
        }
    }

    pub fn download_count(&self) -> usize {
        self.downloads.iter().filter(|d| d.result.is_ok()).count()
    }

    pub fn failed_downloads(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.downloads.iter().filter(|d| d.result.is_err())
    }

    /// Whether every admitted unit of work succeeded
    pub fn is_complete(&self) -> bool {
        self.index_error.is_none()
            && self.sink_error.is_none()
            && self.failures.is_empty()
            && self.lost.is_empty()
            && self.downloads.iter().all(|d| d.result.is_ok())
    }
}

/// Outcome of a whole run, newest year first
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub years: Vec<YearReport>,

    /// Failure fetching the site root; years then fall back to conventional URLs
    pub index_error: Option<FetchError>,

    /// Year tasks that panicked or were cancelled
    pub lost_years: Vec<String>,
}

impl HarvestReport {
    pub fn record_count(&self) -> usize {
        self.years.iter().map(|y| y.records.len()).sum()
    }

    /// Number of PDFs written completely
    pub fn download_count(&self) -> usize {
        self.years.iter().map(YearReport::download_count).sum()
    }

    /// All records of the run, year by year
    pub fn records(&self) -> impl Iterator<Item = &PaperRecord> {
        self.years.iter().flat_map(|y| y.records.iter())
    }

    pub fn year(&self, year: u16) -> Option<&YearReport> {
        self.years.iter().find(|y| y.year == year)
    }

    pub fn is_complete(&self) -> bool {
        self.lost_years.is_empty() && self.years.iter().all(YearReport::is_complete)
    }
}

enum PaperOutcome {
    Scraped {
        target: CrawlTarget,
        metadata: PaperMetadata,
        pdfs: Vec<CrawlTarget>,
        slot: OwnedSemaphorePermit,
    },
    Failed(FetchError),
}

/// Drives a harvest run
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: Arc<HarvestConfig>,
    fetcher: Fetcher,
    downloader: Downloader,
    sink: ResultSink,
    events: Option<UnboundedSender<HarvestEvent>>,
}

impl Scheduler {
    /// Create a scheduler with a fetcher built from the configuration
    pub fn new(config: HarvestConfig) -> Result<Self, CrawlError> {
        let fetcher = Fetcher::from_config(&config)?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Create a scheduler around an existing fetcher
    pub fn with_fetcher(config: HarvestConfig, fetcher: Fetcher) -> Self {
        let sink = ResultSink::from_config(&config);
        Self {
            config: Arc::new(config),
            downloader: Downloader::new(fetcher.clone()),
            fetcher,
            sink,
            events: None,
        }
    }

    /// Stream progress events to `sender`
    pub fn with_events(mut self, sender: UnboundedSender<HarvestEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    fn emit(&self, event: HarvestEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = events.send(event);
        }
    }

    /// Harvest every configured year
    #[instrument(skip(self), fields(base = %self.config.base_url))]
    pub async fn run(&self) -> HarvestReport {
        let mut report = HarvestReport::default();
        let year_urls = self.discover_years(&mut report).await;

        let semaphore = Arc::new(Semaphore::new(self.config.year_concurrency));
        let mut years = JoinSet::new();
        for (year, url) in year_urls {
            let scheduler = self.clone();
            let semaphore = semaphore.clone();
            let scope = self.config.year_scope(year);
            years.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                scheduler.run_year(scope, url).await
            });
        }

        while let Some(joined) = years.join_next().await {
            match joined {
                Ok(year_report) => report.years.push(year_report),
                Err(e) => {
                    error!("Year task failed: {}", e);
                    report.lost_years.push(e.to_string());
                }
            }
        }
        report.years.sort_by(|a, b| b.year.cmp(&a.year));

        info!(
            "Harvest finished: {} records, {} PDFs across {} years",
            report.record_count(),
            report.download_count(),
            report.years.len()
        );
        report
    }

    /// Map every configured year to its index URL
    async fn discover_years(&self, report: &mut HarvestReport) -> Vec<(u16, Url)> {
        let range = self.config.years;
        let mut listed: HashMap<u16, Url> = HashMap::new();

        match self.fetcher.fetch(&self.config.base_url).await {
            Ok(html) => {
                for target in year_links(&html, &self.config.base_url) {
                    if let Some(year) = target.year().filter(|y| range.contains(*y)) {
                        listed.entry(year).or_insert(target.url);
                    }
                }
                debug!("Site index lists {} configured years", listed.len());
            }
            Err(e) => {
                warn!("Site index unavailable, using conventional year URLs: {}", e);
                report.index_error = Some(e);
            }
        }

        let mut year_urls = Vec::with_capacity(range.len());
        for year in range.iter() {
            if let Some(url) = listed.remove(&year) {
                year_urls.push((year, url));
                continue;
            }
            match self.config.year_url(year) {
                Ok(url) => {
                    debug!("Year {} not listed, falling back to {}", year, url);
                    year_urls.push((year, url));
                }
                Err(e) => error!("Cannot build URL for year {}: {}", year, e),
            }
        }
        year_urls
    }

    /// Scrape one year: its papers, their rows and their PDFs
    #[instrument(skip(self, url), fields(year = scope.year))]
    pub async fn run_year(&self, scope: YearScope, url: Url) -> YearReport {
        let year = scope.year;
        let mut report = YearReport::new(year);
        info!("Scraping papers for {}", year);

        let html = match self.fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                error!("Failed to fetch {} index: {}", year, e);
                report.index_error = Some(e);
                // A metadata file from an earlier run would pass for this one.
                if let Err(e) = self.sink.remove_year_records(year).await {
                    error!("Failed to remove stale metadata for {}: {}", year, e);
                    report.sink_error = Some(e);
                }
                return report;
            }
        };
        let links = paper_links(&html, &url);
        if links.is_empty() {
            warn!("No papers found for {}", year);
        }
        self.emit(HarvestEvent::YearStarted {
            year,
            papers: links.len(),
        });

        let mut registry = self.sink.destinations(year);
        if self.config.download_pdfs {
            if let Err(e) = self.sink.ensure_path(&self.sink.year_dir(year)).await {
                error!("Cannot create PDF directory for {}: {}", year, e);
                report.sink_error = Some(e);
            }
        }
        let download_pdfs = self.config.download_pdfs && report.sink_error.is_none();

        let total = links.len();
        let mut pending = links.into_iter();
        let mut admitted = 0usize;
        let slots = Arc::new(Semaphore::new(self.config.paper_concurrency));
        let mut papers = JoinSet::new();
        let mut downloads = JoinSet::new();

        loop {
            while scope.admits(report.records.len(), papers.len()) {
                let Ok(slot) = slots.clone().try_acquire_owned() else {
                    break;
                };
                let Some(target) = pending.next() else {
                    break;
                };
                admitted += 1;
                papers.spawn(Self::scrape_paper(self.fetcher.clone(), target, slot));
            }

            tokio::select! {
                Some(joined) = papers.join_next() => match joined {
                    Ok(PaperOutcome::Scraped {
                        target,
                        metadata,
                        pdfs,
                        slot,
                    }) => {
                        let jobs = if download_pdfs {
                            Self::plan_downloads(&mut registry, &target, &metadata, &pdfs)
                        } else {
                            Vec::new()
                        };
                        let sequence_number = report.records.len() + 1;
                        let record =
                            PaperRecord::new(sequence_number, year, metadata, primary_pdf(&pdfs));

                        info!(
                            "{} | {}: {} - Authors: {}",
                            year, record.sequence_number, record.title, record.authors
                        );
                        self.emit(HarvestEvent::PaperScraped {
                            year,
                            sequence_number: record.sequence_number,
                            title: record.title.clone(),
                        });
                        report.records.push(record);

                        if !jobs.is_empty() {
                            self.spawn_downloads(&mut downloads, jobs, slot);
                        }
                    }
                    Ok(PaperOutcome::Failed(e)) => {
                        warn!("Failed to fetch paper page: {}", e);
                        self.emit(HarvestEvent::PaperFailed {
                            year,
                            url: e.url.clone(),
                            reason: e.cause.to_string(),
                        });
                        report.failures.push(e);
                    }
                    Err(e) => {
                        error!("Paper task failed: {}", e);
                        report.lost.push(e.to_string());
                    }
                },
                Some(joined) = downloads.join_next() => match joined {
                    Ok(outcomes) => self.collect_downloads(&mut report, outcomes),
                    Err(e) => {
                        error!("Download task failed: {}", e);
                        report.lost.push(e.to_string());
                    }
                },
                else => break,
            }
        }

        report.skipped = total - admitted;
        if report.skipped > 0 {
            info!(
                "Reached maximum papers ({}) for {}, skipped {} links",
                scope.paper_cap.unwrap_or_default(),
                year,
                report.skipped
            );
        }

        match self.sink.write_year_records(year, &report.records).await {
            Ok(path) => report.metadata_path = Some(path),
            Err(e) => {
                error!("Failed to write metadata for {}: {}", year, e);
                if report.sink_error.is_none() {
                    report.sink_error = Some(e);
                }
            }
        }

        self.emit(HarvestEvent::YearFinished {
            year,
            records: report.records.len(),
        });
        report
    }

    /// Fetch a paper page once and derive both branches from the same body
    ///
    /// `slot` travels with a scraped paper so it can be held through the
    /// paper's downloads; a failed paper releases it here.
    async fn scrape_paper(
        fetcher: Fetcher,
        target: CrawlTarget,
        slot: OwnedSemaphorePermit,
    ) -> PaperOutcome {
        match fetcher.fetch(&target.url).await {
            Ok(html) => {
                let metadata = extract_metadata(&html);
                let pdfs = pdf_links(&html, &target.url);
                PaperOutcome::Scraped {
                    target,
                    metadata,
                    pdfs,
                    slot,
                }
            }
            Err(e) => PaperOutcome::Failed(e),
        }
    }

    /// One job per PDF link, named after the paper's display label
    fn plan_downloads(
        registry: &mut DestinationRegistry,
        target: &CrawlTarget,
        metadata: &PaperMetadata,
        pdfs: &[CrawlTarget],
    ) -> Vec<DownloadJob> {
        let name = if target.label.is_empty() {
            metadata.title.as_str()
        } else {
            target.label.as_str()
        };
        pdfs.iter()
            .map(|pdf| registry.job(name, pdf.url.clone()))
            .collect()
    }

    /// Download one paper's PDFs as a single task that holds the paper's slot
    fn spawn_downloads(
        &self,
        downloads: &mut JoinSet<Vec<DownloadOutcome>>,
        jobs: Vec<DownloadJob>,
        slot: OwnedSemaphorePermit,
    ) {
        let downloader = self.downloader.clone();
        let limit = self.config.pdf_concurrency;
        downloads.spawn(async move {
            let outcomes: Vec<DownloadOutcome> = stream::iter(jobs)
                .map(|job| {
                    let downloader = downloader.clone();
                    async move {
                        let result = downloader.download(&job).await;
                        DownloadOutcome { job, result }
                    }
                })
                .buffer_unordered(limit)
                .collect()
                .await;
            drop(slot);
            outcomes
        });
    }

    fn collect_downloads(&self, report: &mut YearReport, outcomes: Vec<DownloadOutcome>) {
        let year = report.year;
        for outcome in outcomes {
            match &outcome.result {
                Ok(bytes) => {
                    info!("Downloaded: {}", outcome.job.destination.display());
                    self.emit(HarvestEvent::PdfDownloaded {
                        year,
                        path: outcome.job.destination.clone(),
                        bytes: *bytes,
                    });
                }
                Err(e) => {
                    warn!("Error downloading: {}", e);
                    self.emit(HarvestEvent::PdfFailed {
                        year,
                        url: e.url.clone(),
                        reason: e.cause.to_string(),
                    });
                }
            }
            report.downloads.push(outcome);
        }
    }
}

/// PDF recorded in the metadata row: the one labelled "Paper", else the first
fn primary_pdf(pdfs: &[CrawlTarget]) -> Option<String> {
    pdfs.iter()
        .find(|pdf| pdf.label.contains("Paper"))
        .or_else(|| pdfs.first())
        .map(|pdf| pdf.url.to_string())
}
