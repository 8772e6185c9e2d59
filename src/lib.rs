//! # paperharvest - Conference Proceedings Harvester
//!
//! This crate crawls a conference publication site, collects one metadata row
//! per paper, downloads the linked PDFs and labels every paper with a topic
//! category through an external classifier.
//!
//! ## Features
//!
//! - Three-level discovery: site root, year index pages, paper-detail pages
//! - Independent concurrency ceilings for years, papers and PDFs
//! - Optional per-year paper cap enforced at admission time
//! - Failures contained per paper and per PDF, reported in a structured outcome
//! - Streaming PDF downloads to collision-free paths
//! - Per-year metadata CSV rewritten on every run
//! - Quota-aware annotation pass backed by Gemini
//!
//! ## Example
//!
//! ```rust,no_run
//! use paperharvest::crawler::{HarvestConfig, Scheduler, YearRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarvestConfig::builder()
//!         .years(YearRange::new(2021, 2023))
//!         .paper_cap(Some(10))
//!         .build();
//!
//!     let report = Scheduler::new(config)?.run().await;
//!     println!(
//!         "{} papers, {} PDFs",
//!         report.record_count(),
//!         report.download_count()
//!     );
//!     Ok(())
//! }
//! ```

mod error;

pub mod annotate;
pub mod crawler;

pub use error::{Error, Result};

/// Re-export of the types most callers need
pub mod prelude {
    pub use crate::annotate::{Classifier, GeminiClassifier, RetryPolicy, TokioSleeper};
    pub use crate::crawler::{HarvestConfig, HarvestReport, PaperRecord, Scheduler, YearRange};
    pub use crate::error::Error;
    pub use crate::error::Result;
}
