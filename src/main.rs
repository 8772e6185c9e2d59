//! # paperharvest CLI Application
//!
//! Command-line front end for the harvester.
//!
//! ## Subcommands
//!
//! - `crawl`: Scrape metadata and download PDFs for a range of years
//! - `annotate`: Label every metadata file with topic categories
//! - `run`: `crawl` followed by `annotate`
//!
//! Progress of a crawl is drawn from the scheduler's event channel; logs go to
//! stderr and optionally to a file. The process exits with a failure status
//! when any page or PDF of the run failed.

mod telemetry;

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paperharvest::annotate::{
    DEFAULT_MODEL, GeminiClassifier, RetryPolicy, TokioSleeper, annotate_dir,
};
use paperharvest::crawler::{
    DEFAULT_BASE_URL, HarvestConfig, HarvestEvent, HarvestReport, Scheduler, YearRange,
};
use tokio::sync::mpsc;
use tracing::instrument;

#[derive(Parser)]
#[command(author, version, about = "Harvest conference proceedings: metadata, PDFs and topic labels", long_about = None)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape paper metadata and download PDFs
    Crawl(CrawlArgs),

    /// Classify the papers of every metadata file
    Annotate(AnnotateArgs),

    /// Crawl, then annotate the results
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// First year to harvest
    #[arg(long, default_value = "2023")]
    start_year: u16,

    /// Last year to harvest
    #[arg(long, default_value = "2023")]
    end_year: u16,

    /// Maximum number of papers per year
    #[arg(short = 'n', long, default_value = "5")]
    max_papers: usize,

    /// Harvest every paper of each year
    #[arg(long, conflicts_with = "max_papers")]
    no_cap: bool,

    /// Years processed at once (default: number of years)
    #[arg(long)]
    year_concurrency: Option<usize>,

    /// Paper pages in flight per year
    #[arg(long, default_value = "64")]
    paper_concurrency: usize,

    /// PDF downloads in flight per paper
    #[arg(long, default_value = "4")]
    pdf_concurrency: usize,

    /// Ceiling on requests per second across the run
    #[arg(long)]
    requests_per_second: Option<NonZeroU32>,

    /// Request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Root URL of the proceedings site
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Directory for the per-year metadata files
    #[arg(long, default_value = "MetaData_Results")]
    metadata_dir: PathBuf,

    /// Directory for the downloaded PDFs
    #[arg(long, default_value = "Scrap_Results")]
    results_dir: PathBuf,

    /// Prefix of the metadata file names
    #[arg(long, default_value = "NeurIPS")]
    site_prefix: String,

    /// Skip PDF downloads
    #[arg(long)]
    no_pdfs: bool,
}

impl CrawlArgs {
    fn to_config(&self) -> anyhow::Result<HarvestConfig> {
        let mut builder = HarvestConfig::builder()
            .base_url_str(&self.base_url)?
            .years(YearRange::new(self.start_year, self.end_year))
            .paper_cap((!self.no_cap).then_some(self.max_papers))
            .paper_concurrency(self.paper_concurrency)
            .pdf_concurrency(self.pdf_concurrency)
            .requests_per_second(self.requests_per_second)
            .request_timeout(Duration::from_secs(self.timeout))
            .metadata_root(&self.metadata_dir)
            .results_root(&self.results_dir)
            .site_prefix(&self.site_prefix)
            .download_pdfs(!self.no_pdfs);
        if let Some(year_concurrency) = self.year_concurrency {
            builder = builder.year_concurrency(year_concurrency);
        }
        Ok(builder.build())
    }
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Gemini model used for classification
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Seconds to wait after a quota error before retrying
    #[arg(long, default_value = "60")]
    cooldown: u64,
}

impl ClassifyArgs {
    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            cooldown: Duration::from_secs(self.cooldown),
            ..RetryPolicy::default()
        }
    }
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Directory holding the metadata files
    #[arg(long, default_value = "MetaData_Results")]
    metadata_dir: PathBuf,

    #[command(flatten)]
    classify: ClassifyArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    crawl: CrawlArgs,

    #[command(flatten)]
    classify: ClassifyArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse command line arguments
    let cli = Cli::parse();
    telemetry::init_tracing_subscriber(cli.log_file.as_deref())?;

    let complete = match cli.command {
        Some(Commands::Crawl(args)) => crawl_command(&args).await?.is_complete(),
        Some(Commands::Annotate(args)) => {
            annotate_command(&args.metadata_dir, &args.classify).await?;
            true
        }
        Some(Commands::Run(args)) => {
            let report = crawl_command(&args.crawl).await?;
            annotate_command(&args.crawl.metadata_dir, &args.classify).await?;
            report.is_complete()
        }
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["paperharvest", "--help"]);
            true
        }
    };

    Ok(if complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[instrument(skip(args))]
async fn crawl_command(args: &CrawlArgs) -> anyhow::Result<HarvestReport> {
    let config = args.to_config()?;
    println!(
        "Harvesting {} for {}..={}",
        config.base_url,
        config.years.start(),
        config.years.end()
    );
    let cap = config.paper_cap;

    // Create a channel for progress updates
    let (progress_sender, mut progress_receiver) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(config)?.with_events(progress_sender);

    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers {msg}")
            .map_err(|e| anyhow!("Invalid progress template: {}", e))?
            .progress_chars("##-"),
    );

    // Spawn a task to process progress updates
    let progress_handle = tokio::spawn({
        let progress_bar = progress_bar.clone();
        async move {
            let (mut pdfs, mut failures) = (0usize, 0usize);
            while let Some(event) = progress_receiver.recv().await {
                match event {
                    HarvestEvent::YearStarted { papers, .. } => {
                        let expected = cap.map_or(papers, |cap| cap.min(papers));
                        progress_bar.inc_length(expected as u64);
                    }
                    HarvestEvent::PaperScraped { year, title, .. } => {
                        progress_bar.inc(1);
                        progress_bar.set_message(format!(
                            "({} PDFs, {} failures) {}: {}",
                            pdfs, failures, year, title
                        ));
                    }
                    HarvestEvent::PdfDownloaded { .. } => pdfs += 1,
                    HarvestEvent::PaperFailed { .. } | HarvestEvent::PdfFailed { .. } => {
                        failures += 1
                    }
                    HarvestEvent::YearFinished { year, records } => {
                        progress_bar.println(format!("{}: {} papers", year, records));
                    }
                }
            }
            // Signal that we're done processing updates
            progress_bar.finish_with_message("Harvest completed");
        }
    });

    let report = scheduler.run().await;
    // Closing the last sender ends the progress task
    drop(scheduler);
    progress_handle.await?;

    print_report(&report);
    Ok(report)
}

fn print_report(report: &HarvestReport) {
    println!(
        "Harvested {} papers and {} PDFs across {} years",
        report.record_count(),
        report.download_count(),
        report.years.len()
    );
    for year in &report.years {
        let mut line = format!(
            "  {}: {} papers, {} PDFs",
            year.year,
            year.records.len(),
            year.download_count()
        );
        if !year.failures.is_empty() {
            line.push_str(&format!(", {} pages failed", year.failures.len()));
        }
        let failed_pdfs = year.failed_downloads().count();
        if failed_pdfs > 0 {
            line.push_str(&format!(", {} PDFs failed", failed_pdfs));
        }
        if year.skipped > 0 {
            line.push_str(&format!(", {} skipped by cap", year.skipped));
        }
        if let Some(e) = &year.index_error {
            line.push_str(&format!(", index failed: {}", e));
        }
        if let Some(e) = &year.sink_error {
            line.push_str(&format!(", output failed: {}", e));
        }
        if !year.lost.is_empty() {
            line.push_str(&format!(", {} tasks lost", year.lost.len()));
        }
        println!("{}", line);
    }
    if !report.is_complete() {
        println!("Run incomplete; see the log for the failed units");
    }
}

#[instrument(skip(args))]
async fn annotate_command(metadata_dir: &Path, args: &ClassifyArgs) -> anyhow::Result<()> {
    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| anyhow!("GEMINI_API_KEY environment variable must be set"))?;
    let classifier = GeminiClassifier::new(api_key, &args.model)?;

    println!(
        "Annotating {} with {}...",
        metadata_dir.display(),
        classifier.model()
    );
    let summaries = annotate_dir(metadata_dir, &classifier, &TokioSleeper, &args.policy()).await?;

    for summary in &summaries {
        println!(
            "Annotation complete for {}: {} classified, {} missing data, {} errors",
            summary.path.display(),
            summary.classified,
            summary.missing,
            summary.errors
        );
    }
    Ok(())
}
