//! Streaming PDF downloads
//!
//! The response status is checked before the destination is created, so a
//! rejected request leaves nothing on disk. Once writing has started, a
//! failure leaves the partial file in place.
//!
//! The body has no overall deadline. Each read must deliver data within the
//! fetcher's timeout, otherwise the download fails as stalled.

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use crate::crawler::error::{DownloadCause, DownloadError, FetchCause};
use crate::crawler::{DownloadJob, Fetcher};

/// Size of the blocks written to disk
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Writes PDF responses to local storage
#[derive(Debug, Clone)]
pub struct Downloader {
    fetcher: Fetcher,
}

impl Downloader {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    /// Stream `job.pdf_url` into `job.destination`
    ///
    /// The destination's parent directory must already exist.
    ///
    /// # Returns
    ///
    /// The number of bytes written
    #[instrument(skip(self, job), fields(url = %job.pdf_url, path = %job.destination.display()))]
    pub async fn download(&self, job: &DownloadJob) -> Result<u64, DownloadError> {
        let url = job.pdf_url.as_str();
        let fail = |cause: DownloadCause| {
            DownloadError::new(url, job.destination.clone(), cause)
        };

        let response = self
            .fetcher
            .get(&job.pdf_url)
            .await
            .map_err(|e| fail(e.into()))?;

        let file = File::create(&job.destination)
            .await
            .map_err(|e| fail(e.into()))?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);

        let idle = self.fetcher.timeout();
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        loop {
            let next = tokio::time::timeout(idle, stream.next())
                .await
                .map_err(|_| fail(FetchCause::TimedOut(idle).into()))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| fail(FetchCause::from(e).into()))?;
            for block in chunk.chunks(CHUNK_SIZE) {
                writer.write_all(block).await.map_err(|e| fail(e.into()))?;
            }
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(|e| fail(e.into()))?;

        debug!("Wrote {} bytes", written);
        Ok(written)
    }
}
