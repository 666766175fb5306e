//! Defines the custom error types for the diesel-leads application.

use std::io;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for lead discovery, import and export.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// A capability was invoked without the credential it needs.
    #[error("Missing credential: {0} is not configured")]
    MissingCredential(&'static str),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a TOML configuration file.
    #[error("TOML Error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// A source URL had no usable host.
    #[error("Domain Extraction Error: {0}")]
    DomainExtraction(String),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// An external service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {message}")]
    Upstream {
        /// Which collaborator failed (search, llm, geocoder, sheets).
        service: &'static str,
        /// The HTTP status code.
        status: u16,
        /// Response body or summary.
        message: String,
    },

    /// The external service rejected the call because of rate limiting.
    #[error("{0}: rate limit exceeded, try again later")]
    RateLimited(&'static str),

    /// The external service requires payment or credits.
    #[error("{0}: payment required, add credits to continue")]
    PaymentRequired(&'static str),

    /// The external service answered, but not in a usable shape.
    #[error("{0} returned a malformed response: {1}")]
    MalformedResponse(&'static str, String),

    /// The external call did not finish in time.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Building or sending a notification email failed.
    #[error("Email Error: {0}")]
    Email(String),

    /// Spreadsheet export failed in a way the user must act on.
    #[error("Sheets Sync Error: {0}")]
    Sheets(String),

    /// Signing the service-account assertion failed.
    #[error("JWT Error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// A referenced client record does not exist.
    #[error("Not Found: {0}")]
    NotFound(String),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    /// True for failures of an external collaborator that a batch should
    /// recover from locally rather than abort on.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Request(_)
                | AppError::Upstream { .. }
                | AppError::RateLimited(_)
                | AppError::PaymentRequired(_)
                | AppError::MalformedResponse(..)
                | AppError::Timeout(_)
        )
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(e: lettre::error::Error) -> Self {
        AppError::Email(e.to_string())
    }
}

impl From<lettre::address::AddressError> for AppError {
    fn from(e: lettre::address::AddressError) -> Self {
        AppError::Email(format!("invalid address: {}", e))
    }
}

impl From<lettre::transport::smtp::Error> for AppError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        AppError::Email(e.to_string())
    }
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_recoverable() {
        assert!(AppError::RateLimited("llm").is_transient());
        assert!(AppError::Timeout("search").is_transient());
        assert!(
            AppError::Upstream {
                service: "geocoder",
                status: 500,
                message: "boom".to_string()
            }
            .is_transient()
        );
        assert!(!AppError::MissingCredential("FIRECRAWL_API_KEY").is_transient());
        assert!(!AppError::Config("bad".to_string()).is_transient());
    }

    #[test]
    fn test_messages_name_the_service() {
        let err = AppError::PaymentRequired("llm");
        assert_eq!(err.to_string(), "llm: payment required, add credits to continue");
        let err = AppError::MissingCredential("GOOGLE_SERVICE_ACCOUNT_KEY");
        assert!(err.to_string().contains("GOOGLE_SERVICE_ACCOUNT_KEY"));
    }
}
