//! HTTP fetching for the crawler module
//!
//! The fetcher issues exactly one request per call. It never retries; the
//! caller decides whether a failure is skipped, logged or fatal.
//!
//! The configured timeout bounds connecting, waiting for the response head, and
//! for [`Fetcher::fetch`] the whole page. Streamed bodies are bounded per read
//! by the caller, so a large PDF that keeps arriving is never cut off.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client as ReqwestClient, Response};
use tracing::{Instrument, debug, debug_span, instrument};
use url::Url;

use crate::crawler::HarvestConfig;
use crate::crawler::error::{CrawlError, FetchCause, FetchError};

/// HTTP client shared by every worker of a run
#[derive(Clone)]
pub struct Fetcher {
    client: ReqwestClient,
    timeout: Duration,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("timeout", &self.timeout)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

impl Fetcher {
    /// Create a fetcher with the given timeout and user agent
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, CrawlError> {
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            timeout,
            limiter: None,
        })
    }

    /// Create a fetcher from a harvest configuration
    pub fn from_config(config: &HarvestConfig) -> Result<Self, CrawlError> {
        let fetcher = Self::new(config.request_timeout, &config.user_agent)?;
        Ok(match config.requests_per_second {
            Some(rate) => fetcher.with_rate_limit(rate),
            None => fetcher,
        })
    }

    /// Cap the number of requests issued per second across all clones
    pub fn with_rate_limit(mut self, requests_per_second: std::num::NonZeroU32) -> Self {
        let limiter = RateLimiter::direct(Quota::per_second(requests_per_second));
        self.limiter = Some(Arc::new(limiter));
        self
    }

    /// Longest wait for any single step of a request
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a GET and return the response if its status is a success
    ///
    /// Only the response head is awaited; reading the body is up to the caller.
    pub async fn get(&self, url: &Url) -> Result<Response, FetchError> {
        self.wait_turn().await;
        self.within(url, self.send(url)).await
    }

    /// Fetch a page body as text
    #[instrument(skip(self), fields(url = %url), level = "debug")]
    pub async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        self.wait_turn().await;
        let body = self
            .within(url, async {
                let response = self.send(url).await?;
                response
                    .text()
                    .await
                    .map_err(|e| FetchError::new(url.as_str(), e))
            })
            .await?;

        debug!("Fetched {} bytes", body.len());
        Ok(body)
    }

    async fn wait_turn(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().instrument(debug_span!("limiter")).await;
        }
    }

    async fn send(&self, url: &Url) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::new(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(url.as_str(), FetchCause::Status(status)));
        }

        Ok(response)
    }

    async fn within<T>(
        &self,
        url: &Url,
        work: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::new(
                url.as_str(),
                FetchCause::TimedOut(self.timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use reqwest::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fetcher() -> Fetcher {
        Fetcher::new(Duration::from_secs(5), "paperharvest-test").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("GET", "/page")
            .match_header("user-agent", "paperharvest-test")
            .with_status(200)
            .with_body("<html>hello</html>")
            .expect(1)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/page", server.url())).unwrap();
        let body = fetcher().fetch(&url).await.unwrap();
        assert_eq!(body, "<html>hello</html>");

        mock_server.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_status_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/missing", server.url())).unwrap();
        let err = fetcher().fetch(&url).await.unwrap_err();

        assert_eq!(err.url, url.as_str());
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(matches!(err.cause, FetchCause::Status(_)));

        mock_server.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_network_error() {
        // Nothing listens on port 9 of localhost in the test environment.
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err.cause, FetchCause::Http(_)));
    }

    #[tokio::test]
    async fn test_fetch_gives_up_on_a_page_that_never_finishes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n<html>")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let fetcher = Fetcher::new(Duration::from_millis(300), "paperharvest-test").unwrap();
        let url = Url::parse(&format!("http://{}/stuck.html", addr)).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err.cause, FetchCause::TimedOut(t) if t == Duration::from_millis(300)));
        assert_eq!(err.status(), None);
    }
}
