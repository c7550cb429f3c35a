//! Error types for the accelerator client.

use thiserror::Error;

/// Errors returned by accelerator requests.
#[derive(Debug, Error)]
pub enum AcceleratorError {
    /// The accelerator is switched off in configuration.
    #[error("accelerator is disabled")]
    Disabled,

    /// The accelerator is enabled but not recently healthy.
    #[error("accelerator is unavailable")]
    Unavailable,

    /// An attempt exceeded the per-request timeout and was cancelled.
    #[error("accelerator request timed out on attempt {attempt}")]
    Timeout {
        /// Attempt number, starting at 1.
        attempt: u32,
    },

    /// Transport-level failure.
    #[error("accelerator HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The accelerator answered with a non-success status.
    #[error("accelerator returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Retrying would exceed the cumulative deadline.
    #[error("accelerator deadline exceeded after {attempts} attempts: {last}")]
    DeadlineExceeded {
        /// Attempts made.
        attempts: u32,
        /// Last failure seen.
        last: Box<AcceleratorError>,
    },

    /// Base URL or path could not be joined.
    #[error("invalid accelerator URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be built.
    #[error("accelerator client error: {0}")]
    Client(String),
}

impl AcceleratorError {
    /// Whether another attempt may succeed.
    ///
    /// Timeouts are aborts and are not retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}
