//! Error types for search operations
//!
//! Covers request validation, search-engine transport failures and response
//! decoding, with retry classification for the engine client.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Error types for search operations
#[derive(Debug, Error)]
pub enum SearchError {
    /// The request parameters were rejected before reaching the engine
    #[error("Invalid search request: {0}")]
    InvalidRequest(String),

    /// The search engine answered with a non-success status
    #[error("Search engine at {host} returned {status}: {body}")]
    Status {
        host: String,
        status: u16,
        body: String,
    },

    /// No configured host could be reached
    #[error("All search hosts failed, last error: {0}")]
    Unavailable(String),

    /// The engine's response did not have the expected shape
    #[error("Malformed search response: {0}")]
    MalformedResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    /// Check if error is transient and should be retried
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Unavailable(_) | SearchError::Http(_) => true,
            SearchError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get suggested retry delay for transient errors
    #[must_use]
    pub fn retry_delay(&self) -> Option<Duration> {
        if self.is_transient() {
            Some(Duration::from_millis(100))
        } else {
            None
        }
    }
}

/// Retry configuration for search-engine requests
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Rounds over the full host list
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for given attempt number (0-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (self.initial_delay.as_millis() as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}

/// Helper macro for logging search operations with timing
#[macro_export]
macro_rules! log_search_operation {
    ($op:expr, $account:expr) => {{
        let start = std::time::Instant::now();
        let result = $op;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::debug!(
                    account = %$account,
                    duration_ms = duration.as_millis(),
                    "Search completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    account = %$account,
                    duration_ms = duration.as_millis(),
                    error = %e,
                    "Search failed"
                );
            }
        }

        result
    }};
}
