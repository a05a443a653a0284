use std::error::Error as StdError;
use thiserror::Error;

/// A type-erased error as it travels through tower services
pub type BoxError = Box<dyn StdError + Send + Sync>;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to build delivery payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Failed to submit delivery task: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Invalid configuration for {key}: {message}")]
    Config { key: String, message: String },
}

impl RelayError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Raised by the delivery path itself.
///
/// A request failing with this error is never captured again, otherwise a broken
/// delivery backend would feed itself an endless stream of reports.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ReportingFailure {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ReportingFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure to hand a delivery task over to the queue
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Delivery queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Delivery queue is closed")]
    Closed,

    #[error("Delivery task rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload rejected: {0}")]
    Invalid(String),
}

/// Whether an error was produced by the delivery path.
///
/// Walks the whole `source()` chain so a reporting failure wrapped by some
/// downstream layer is still recognised.
pub fn originates_from_reporting(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if err.is::<ReportingFailure>()
            || err.is::<SubmissionError>()
            || err.is::<PayloadError>()
            || err.is::<RelayError>()
        {
            return true;
        }
        current = err.source();
    }
    false
}
