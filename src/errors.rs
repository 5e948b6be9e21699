/*!
 * Error types for the bookwai application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Error message from the API
        message: String,
        /// Delay requested by the server through `Retry-After`
        retry_after: Option<Duration>,
    },

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether the same request may succeed if sent again later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_)
            | Self::ParseError(_)
            | Self::ConnectionError(_)
            | Self::RateLimitExceeded { .. } => true,
            Self::ApiError { status_code, .. } => {
                *status_code >= 500 || matches!(status_code, 408 | 409 | 429)
            }
            Self::AuthenticationError(_) => false,
        }
    }

    /// Whether the provider asked us to slow down
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
            || matches!(self, Self::ApiError { status_code: 429, .. })
    }

    /// Server-requested delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised by a single attempt at translating one batch
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The response could not be read as a translation envelope
    #[error("Malformed translation response: {0}")]
    MalformedResponse(String),

    /// The response carried a different number of segments than requested
    #[error("Expected {expected} translated segments, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// The response ids do not match the requested ids
    #[error("Translated ids do not match request (missing: {missing:?}, unexpected: {unexpected:?})")]
    IdMismatch {
        missing: Vec<usize>,
        unexpected: Vec<usize>,
    },

    /// A non-empty source came back with an empty translation
    #[error("Empty translation returned for atom {id}")]
    EmptyTranslation { id: usize },
}

impl TranslationError {
    /// Validation and transport failures are retried; auth and client errors are not
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            _ => true,
        }
    }

    /// Whether the failure came from the provider throttling us
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_rate_limit())
    }

    /// Whether the response was well-formed but did not line up with the request
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::CountMismatch { .. } | Self::IdMismatch { .. } | Self::EmptyTranslation { .. }
        )
    }
}

/// Errors that can occur while reading a content document
#[derive(Error, Debug)]
pub enum MarkupError {
    /// The markup could not be tokenized
    #[error("Markup parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    /// The document bytes are not valid in their declared encoding
    #[error("Document is not valid {0}")]
    Encoding(String),

    /// The document uses an encoding we cannot write back byte-compatibly
    #[error("Unsupported document encoding: {0}")]
    UnsupportedEncoding(String),
}

/// Errors that can occur when opening or writing a document container
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The archive itself is unreadable or could not be written
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A content document could not be parsed
    #[error("Markup error in {path}: {source}")]
    Markup {
        path: String,
        #[source]
        source: MarkupError,
    },

    /// An atom locator no longer resolves to the text it was extracted from
    #[error("Locator {locator} does not match document {path}")]
    LocatorMismatch { path: String, locator: String },

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// A fatal precondition failed before any batch was scheduled
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The external format converter failed
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// Error from the document container
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The job exceeded its failed-batch ceiling and was cancelled
    #[error("Translation aborted: {failed} failed batches exceeded the limit of {limit}")]
    Aborted { failed: usize, limit: usize },

    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_should_be_retryable_and_flagged() {
        let err = ProviderError::RateLimitExceeded {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert!(err.is_retryable());
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_authentication_error_should_not_be_retryable() {
        let err = TranslationError::from(ProviderError::AuthenticationError("bad key".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_api_error_retryability_should_follow_status_code() {
        let server = ProviderError::ApiError { status_code: 503, message: String::new() };
        let client = ProviderError::ApiError { status_code: 400, message: String::new() };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_count_mismatch_should_be_retryable_validation_failure() {
        let err = TranslationError::CountMismatch { expected: 2, actual: 1 };
        assert!(err.is_retryable());
        assert!(err.is_validation_failure());
        assert!(!err.is_rate_limit());
    }
}
