//! # Annotation Module
//!
//! Assigns a topic category to every harvested paper. The classifier is an
//! external service behind the `Classifier` trait; this module owns the
//! retry discipline around it and the CSV pass that writes the results back.
//!
//! Quota errors are never turned into row errors: the same input is retried
//! after a cooldown until it succeeds or the policy gives up.

mod error;
mod gemini;
mod pass;
mod retry;

use std::future::Future;

pub use error::{AnnotateError, ClassifyError};
pub use gemini::{
    CATEGORIES, DEFAULT_MODEL, GeminiClassifier, UNCATEGORIZED, normalize_category, prompt,
};
pub use pass::{
    AnnotationSummary, CATEGORY_HEADER, ERROR_CATEGORY, MISSING_DATA, annotate_csv, annotate_dir,
};
pub use retry::{DEFAULT_COOLDOWN, RetryPolicy, Sleeper, TokioSleeper, classify_with_retry};

/// Assigns a category label to a paper
pub trait Classifier: Send + Sync {
    fn classify(
        &self,
        title: &str,
        abstract_text: &str,
    ) -> impl Future<Output = Result<String, ClassifyError>> + Send;
}
