use std::io;
use thiserror::Error;

/// Custom result type alias for the application
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Typed failures of the remote text-generation API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The API asked us to slow down (HTTP 429 or quota exhausted)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network failure, timeout or 5xx answer
    #[error("transport failure: {0}")]
    Transport(String),

    /// Missing, invalid or revoked API key
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The request itself was rejected (bad payload, unknown model)
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The model refused to answer for safety reasons
    #[error("content filtered: {0}")]
    ContentFiltered(String),
}

impl ApiError {
    /// Checks if this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transport(_))
    }

    /// Checks if this error must abort the whole analysis run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailed(_) | Self::MalformedRequest(_))
    }
}

/// Errors that can occur while producing a report
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// I/O errors
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The source tree is missing or holds no eligible file
    #[error("Collection error: {0}")]
    Collection(String),

    /// Remote API errors that escaped the retry layer
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// `git clone` failed
    #[error("Clone error: {0}")]
    Clone(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// PDF/HTML rendering errors
    #[error("Render error: {0}")]
    Render(String),

    /// Unknown job identifier
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The job has not produced a report yet
    #[error("Job not ready: {0}")]
    JobNotReady(String),

    /// The per-job question allowance is used up
    #[error("Question quota exhausted: {0}")]
    QuotaExhausted(String),

    /// The job queue is full
    #[error("Service busy: {0}")]
    Busy(String),

    /// General message errors
    #[error("{0}")]
    Message(String),
}

impl AnalyzerError {
    /// Creates a new error with the specified message
    pub fn new(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = AnalyzerError::new("test error");
        assert!(matches!(error, AnalyzerError::Message(_)));

        if let AnalyzerError::Message(msg) = error {
            assert_eq!(msg, "test error");
        }
    }

    #[test]
    fn test_api_error_classes() {
        assert!(ApiError::RateLimited("429".into()).is_transient());
        assert!(ApiError::Transport("timeout".into()).is_transient());
        assert!(ApiError::AuthFailed("bad key".into()).is_fatal());
        assert!(ApiError::MalformedRequest("400".into()).is_fatal());

        let filtered = ApiError::ContentFiltered("SAFETY".into());
        assert!(!filtered.is_transient());
        assert!(!filtered.is_fatal());
    }

    #[test]
    fn test_fatal_errors_display_verbatim() {
        let err = AnalyzerError::from(ApiError::AuthFailed("API key not valid".into()));
        assert_eq!(err.to_string(), "API error: authentication failed: API key not valid");

        let collection = AnalyzerError::Collection("no eligible source files".into());
        assert_eq!(collection.to_string(), "Collection error: no eligible source files");
    }
}
