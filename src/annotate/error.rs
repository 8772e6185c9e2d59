//! Error types for the annotate module

use std::path::PathBuf;

use crate::error::Error as CrateError;
use thiserror::Error;

/// A classification call failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// The service refused the call for quota or rate reasons; retry later
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Any other failure; the row is marked and the pass moves on
    #[error("{0}")]
    Other(String),
}

impl ClassifyError {
    /// Classify a service error message
    ///
    /// Messages mentioning `Quota`, `RESOURCE_EXHAUSTED` or a rate limit are
    /// treated as transient quota errors.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("Quota")
            || message.contains("RESOURCE_EXHAUSTED")
            || message.to_lowercase().contains("rate limit")
        {
            Self::Quota(message)
        } else {
            Self::Other(message)
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota(_))
    }
}

/// Error type for annotation passes over metadata files
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// Reading or writing a metadata file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A metadata file is not valid CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The file has no header row
    #[error("{} has no header row", .0.display())]
    MissingHeader(PathBuf),

    /// The metadata directory does not exist
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

impl From<AnnotateError> for CrateError {
    fn from(err: AnnotateError) -> Self {
        match err {
            AnnotateError::Io(e) => CrateError::Io(e),
            AnnotateError::Csv(e) => CrateError::Csv(e),
            AnnotateError::Http(e) => CrateError::Http(e),
            _ => CrateError::Annotate(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_message() {
        assert!(ClassifyError::from_message("429 Quota exceeded for metric").is_quota());
        assert!(ClassifyError::from_message("Rate Limit reached").is_quota());
        assert!(ClassifyError::from_message("status: RESOURCE_EXHAUSTED").is_quota());
        // Case-sensitive for the quota keyword
        assert!(!ClassifyError::from_message("quota").is_quota());
        assert_eq!(
            ClassifyError::from_message("invalid argument"),
            ClassifyError::Other("invalid argument".to_string())
        );
    }
}
