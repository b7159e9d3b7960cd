// Error types for steadypage

use crate::loader::AttemptFailure;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for steadypage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when loading pages, polling conditions or gating requests
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid argument provided to a constructor or operation
    ///
    /// Signals a configuration bug (zero attempts, zero poll interval, malformed
    /// environment override). Never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Navigation target is not a valid absolute URL
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Every navigation attempt failed
    ///
    /// Carries the last observed HTTP status and the failure of the final attempt
    /// (wrong status, driver error or the readiness check that did not hold).
    #[error(
        "Navigation to '{url}' failed after {attempts} attempt(s): {last_failure} (last status: {})",
        display_status(.last_status)
    )]
    Navigation {
        url: String,
        attempts: u32,
        last_status: Option<u16>,
        last_failure: AttemptFailure,
    },

    /// A polled condition never held within its time budget
    #[error(
        "Timed out after {elapsed:?} waiting for {description}: expected {expected}, last observed {last_observed}{}",
        display_last_error(.last_error)
    )]
    PollTimeout {
        description: String,
        expected: String,
        last_observed: String,
        last_error: Option<String>,
        elapsed: Duration,
    },

    /// The probe of a poll failed more often than its error budget allows
    #[error("Probe for {description} failed {failures} time(s), giving up: {message}")]
    ProbeFailed {
        description: String,
        failures: u32,
        message: String,
    },

    /// Error reported by a `BrowserPage` implementation
    #[error("Browser driver error: {0}")]
    Driver(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "none".to_string(),
    }
}

fn display_last_error(error: &Option<String>) -> String {
    match error {
        Some(message) => format!(" (last error: {})", message),
        None => String::new(),
    }
}

impl Error {
    /// Returns true for errors that mean "the condition never held" rather than
    /// an infrastructure fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::PollTimeout { .. })
    }
}
