//! Custom error types for pubanalyzer.
//!
//! All fallible library functions return `Result<T, AnalyzerError>` instead of
//! using `unwrap()`. Malformed fields are never errors; they degrade to
//! null/default values inside the extractor and the normalizer.

use thiserror::Error;

/// Main error type for pubanalyzer operations.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Network-level failure (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The search API answered with an error status
    #[error("HTTP error: {status} - {message}")]
    Http {
        /// Status code returned by the API
        status: u16,
        /// Short description of the failure
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error (missing credential file, missing key)
    #[error("Config error: {0}")]
    Config(String),

    /// Every topic came back empty; nothing to normalize
    #[error("No data: no publications were retrieved for any topic")]
    NoData,

    /// RDF graph serialization error
    #[error("RDF error: {0}")]
    Rdf(String),
}

impl AnalyzerError {
    /// Whether a fetch that failed with this error may be attempted again.
    ///
    /// Network faults are always transient; HTTP statuses are decided by the
    /// retry policy, so they are reported as non-transient here.
    pub fn is_network(&self) -> bool {
        matches!(self, AnalyzerError::Network(_))
    }
}

/// Result type alias using `AnalyzerError`
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AnalyzerError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_or_parse() {
        let missing: Option<u8> = None;
        let err = missing.ok_or_parse("search-results missing");
        assert!(matches!(err, Err(AnalyzerError::Parse(ref m)) if m == "search-results missing"));
        assert_eq!(Some(3u8).ok_or_parse("unused").ok(), Some(3));
    }

    #[test]
    fn test_http_error_display() {
        let err = AnalyzerError::Http {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error: 404 - Not Found");
        assert!(!err.is_network());
    }
}
