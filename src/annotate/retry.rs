//! Quota-aware retry around a classifier
//!
//! Quota errors wait out a fixed cooldown and retry the same input; every
//! other error is returned at once. The wait goes through a `Sleeper` so the
//! loop can be driven without real time passing.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::annotate::Classifier;
use crate::annotate::error::ClassifyError;

/// Cooldown applied after a quota error
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Source of delays for the retry loop
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How quota errors are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between attempts
    pub cooldown: Duration,

    /// Total attempts allowed, `None` to retry forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    fn allows_another(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

/// Classify `title` and `abstract_text`, retrying on quota errors
pub async fn classify_with_retry<C, S>(
    classifier: &C,
    sleeper: &S,
    policy: &RetryPolicy,
    title: &str,
    abstract_text: &str,
) -> Result<String, ClassifyError>
where
    C: Classifier,
    S: Sleeper,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match classifier.classify(title, abstract_text).await {
            Ok(category) => {
                debug!("Classified '{}' as {} after {} attempts", title, category, attempts);
                return Ok(category);
            }
            Err(e) if e.is_quota() && policy.allows_another(attempts) => {
                warn!(
                    "Rate limit encountered, waiting {:?} before retrying: {}",
                    policy.cooldown, e
                );
                sleeper.sleep(policy.cooldown).await;
            }
            Err(e) => return Err(e),
        }
    }
}
