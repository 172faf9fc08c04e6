//! Error types and handling for the Poseidon aggregation backend

use thiserror::Error;

/// Main error type for the Poseidon backend
#[derive(Error, Debug)]
pub enum PoseidonError {
    /// Configuration-related errors (missing credentials, malformed point list)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Caller input errors on single-point lookups
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Upstream failure surfaced on a single-point lookup
    #[error("Upstream error: {source}")]
    Upstream {
        #[from]
        source: SourceFailure,
    },

    /// The aggregation was cancelled before every point completed
    #[error("Aggregation cancelled")]
    Cancelled,

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl PoseidonError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            PoseidonError::Config { .. } => {
                "Configuration error. Please check the service keys and point list.".to_string()
            }
            PoseidonError::Validation { message } => format!("Invalid input: {message}"),
            PoseidonError::Upstream { source } => source.reason().to_string(),
            PoseidonError::Cancelled => "The request was cancelled.".to_string(),
            PoseidonError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            PoseidonError::General { message } => message.clone(),
        }
    }
}

/// Typed failure returned by a single upstream call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceFailure {
    /// Timeout, connection refused or non-2xx HTTP status
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The provider answered with a non-success result code
    #[error("upstream returned code {code}: {message}")]
    UpstreamErrorCode { code: String, message: String },

    /// The call succeeded but carried no rows
    #[error("empty result: {0}")]
    EmptyResult(String),

    /// The payload did not have the expected shape
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl SourceFailure {
    /// Short machine-readable reason used in error payloads and logs
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            SourceFailure::UpstreamUnreachable(_) => "upstream-unreachable",
            SourceFailure::UpstreamErrorCode { .. } => "upstream-error-code",
            SourceFailure::EmptyResult(_) => "empty-result",
            SourceFailure::SchemaMismatch(_) => "schema-mismatch",
        }
    }

    #[must_use]
    pub fn is_schema(&self) -> bool {
        matches!(self, SourceFailure::SchemaMismatch(_))
    }
}
