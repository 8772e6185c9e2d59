//! Result persistence for harvested papers
//!
//! Metadata for a year lives in `<metadata_root>/<prefix>_<year>.csv` and is
//! rewritten from scratch on every run. PDFs live in
//! `<results_root>/<year>/<sanitized name>.pdf`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;
use tracing::debug;
use url::Url;

use crate::crawler::error::CrawlError;
use crate::crawler::{DownloadJob, HarvestConfig, PaperRecord};

/// Column headers of the metadata file
pub const METADATA_HEADER: [&str; 6] = [
    "Sr. No", "Year", "Title", "Authors", "Abstract", "PDF Link",
];

const MAX_NAME_LEN: usize = 200;

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s/\\]+").expect("separator regex must compile"));

static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[\x00-\x1f\x7f:*?"<>|]"#).expect("forbidden regex must compile")
});

static UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("underscore regex must compile"));

type Result<T> = std::result::Result<T, CrawlError>;

/// Turn a display name into a single safe path component
///
/// Whitespace and path separators become `_`, characters the common
/// filesystems reject are dropped, `..` sequences are removed and runs of
/// `_` collapse. Leading dots and underscores are trimmed. An empty result becomes `paper`.
pub fn sanitize_name(name: &str) -> String {
    let replaced = SEPARATORS.replace_all(name.trim(), "_");
    let cleaned = FORBIDDEN.replace_all(&replaced, "").replace("..", "");
    let collapsed = UNDERSCORES.replace_all(&cleaned, "_");
    let trimmed = collapsed.trim_start_matches(['.', '_']).trim_end_matches('_');

    let safe: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    if safe.is_empty() {
        "paper".to_string()
    } else {
        safe
    }
}

/// Hands out unique PDF destinations within one year directory
#[derive(Debug)]
pub struct DestinationRegistry {
    dir: PathBuf,
    claimed: HashSet<PathBuf>,
}

impl DestinationRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            claimed: HashSet::new(),
        }
    }

    /// Claim `<name>.pdf`, or `<name>_<n>.pdf` with the smallest free `n >= 2`
    pub fn claim(&mut self, name: &str) -> PathBuf {
        let stem = sanitize_name(name);
        let mut candidate = self.dir.join(format!("{}.pdf", stem));
        let mut n = 2;
        while !self.claimed.insert(candidate.clone()) {
            candidate = self.dir.join(format!("{}_{}.pdf", stem, n));
            n += 1;
        }
        candidate
    }

    /// Build a job for `pdf_url` with a freshly claimed destination
    pub fn job(&mut self, name: &str, pdf_url: Url) -> DownloadJob {
        DownloadJob {
            destination: self.claim(name),
            pdf_url,
        }
    }
}

/// Writes metadata files and lays out PDF directories
#[derive(Debug, Clone)]
pub struct ResultSink {
    metadata_root: PathBuf,
    results_root: PathBuf,
    site_prefix: String,
}

impl ResultSink {
    pub fn new(
        metadata_root: impl Into<PathBuf>,
        results_root: impl Into<PathBuf>,
        site_prefix: impl Into<String>,
    ) -> Self {
        Self {
            metadata_root: metadata_root.into(),
            results_root: results_root.into(),
            site_prefix: site_prefix.into(),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.metadata_root.clone(),
            config.results_root.clone(),
            config.site_prefix.clone(),
        )
    }

    pub fn metadata_root(&self) -> &Path {
        &self.metadata_root
    }

    /// Metadata file of a year
    pub fn metadata_path(&self, year: u16) -> PathBuf {
        self.metadata_root.join(format!("{}_{}.csv", self.site_prefix, year))
    }

    /// Directory receiving the PDFs of a year
    pub fn year_dir(&self, year: u16) -> PathBuf {
        self.results_root.join(year.to_string())
    }

    /// Registry of PDF destinations for a year
    pub fn destinations(&self, year: u16) -> DestinationRegistry {
        DestinationRegistry::new(self.year_dir(year))
    }

    /// Create `path` and all of its parents if absent
    pub async fn ensure_path(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    /// Overwrite a year's metadata file with a header and one row per record
    ///
    /// # Returns
    ///
    /// The path of the written file
    pub async fn write_year_records(&self, year: u16, records: &[PaperRecord]) -> Result<PathBuf> {
        self.ensure_path(&self.metadata_root).await?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(METADATA_HEADER)?;
        for record in records {
            writer.serialize(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| CrawlError::Other(format!("Failed to flush CSV: {}", e)))?;

        let path = self.metadata_path(year);
        fs::write(&path, bytes).await?;
        debug!("Wrote {} rows to {}", records.len(), path.display());
        Ok(path)
    }

    /// Delete a year's metadata file; a missing file is not an error
    pub async fn remove_year_records(&self, year: u16) -> Result<()> {
        let path = self.metadata_path(year);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed stale {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a year's metadata file back
    pub async fn read_year_records(&self, year: u16) -> Result<Vec<PaperRecord>> {
        let content = fs::read(self.metadata_path(year)).await?;
        let mut reader = csv::Reader::from_reader(content.as_slice());
        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<PaperRecord>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(n: usize, title: &str, pdf: Option<&str>) -> PaperRecord {
        PaperRecord {
            sequence_number: n,
            year: 2023,
            title: title.to_string(),
            authors: "A, B".to_string(),
            abstract_text: "Line with, comma and \"quotes\"".to_string(),
            pdf_url: pdf.map(str::to_string),
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Deep Nets for Fun"), "Deep_Nets_for_Fun");
        assert_eq!(sanitize_name("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_name("a\\b/c"), "a_b_c");
        assert_eq!(sanitize_name("What? Why: \"Now\""), "What_Why_Now");
        assert_eq!(sanitize_name("   "), "paper");
        assert_eq!(sanitize_name(".hidden"), "hidden");
        assert_eq!(sanitize_name(&"x".repeat(500)).len(), MAX_NAME_LEN);
    }

    #[test]
    fn test_sanitized_names_never_escape_the_year_dir() {
        let mut registry = DestinationRegistry::new("/out/2023");
        for name in ["..", "../x", "/abs/path", "a/../../b", "C:\\win"] {
            let path = registry.claim(name);
            assert_eq!(path.parent().unwrap(), Path::new("/out/2023"), "{}", name);
        }
    }

    #[test]
    fn test_registry_disambiguates_collisions() {
        let mut registry = DestinationRegistry::new("/out/2023");
        assert_eq!(registry.claim("Same Title"), PathBuf::from("/out/2023/Same_Title.pdf"));
        assert_eq!(registry.claim("Same Title"), PathBuf::from("/out/2023/Same_Title_2.pdf"));
        assert_eq!(registry.claim("Same/Title"), PathBuf::from("/out/2023/Same_Title_3.pdf"));
        assert_eq!(registry.claim("Other"), PathBuf::from("/out/2023/Other.pdf"));
    }

    #[test]
    fn test_layout() {
        let sink = ResultSink::new("meta", "pdfs", "NeurIPS");
        assert_eq!(sink.metadata_path(2021), PathBuf::from("meta/NeurIPS_2021.csv"));
        assert_eq!(sink.year_dir(2021), PathBuf::from("pdfs/2021"));
    }

    #[tokio::test]
    async fn test_write_year_records_overwrites() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path().join("meta"), dir.path().join("pdfs"), "NeurIPS");

        let first = vec![
            record(1, "One", Some("https://x/1.pdf")),
            record(2, "Two", None),
            record(3, "Three", None),
        ];
        sink.write_year_records(2023, &first).await.unwrap();

        let second = vec![record(1, "Only", Some("https://x/only.pdf"))];
        let path = sink.write_year_records(2023, &second).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.starts_with("Sr. No,Year,Title,Authors,Abstract,PDF Link\n"));
        assert_eq!(content.lines().count(), 2);

        let records = sink.read_year_records(2023).await.unwrap();
        assert_eq!(records, second);
    }

    #[tokio::test]
    async fn test_empty_year_still_gets_header() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path(), dir.path(), "NeurIPS");

        let path = sink.write_year_records(1999, &[]).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "Sr. No,Year,Title,Authors,Abstract,PDF Link\n");
        assert!(sink.read_year_records(1999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_year_records() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path(), dir.path(), "NeurIPS");
        let path = sink.write_year_records(2023, &[record(1, "One", None)]).await.unwrap();

        sink.remove_year_records(2023).await.unwrap();
        assert!(!path.exists());
        // Already gone
        sink.remove_year_records(2023).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_path_creates_chain() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path(), dir.path(), "NeurIPS");
        let nested = dir.path().join("a").join("b").join("c");

        sink.ensure_path(&nested).await.unwrap();
        sink.ensure_path(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
