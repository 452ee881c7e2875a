//! Error types for the governance tools.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the governance error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for governance operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote service answered with a non-success status
    #[error("Service rejected the call: {0}")]
    ServiceRejected(String),

    /// The remote service could not be reached (connection, timeout, bad payload)
    #[error("Service unreachable: {0}")]
    ServiceUnreachable(String),

    /// Neither store holds the requested record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input (decision value, status filter, transition)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Mirror read or write failure
    #[error("Persistence error at {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a persistence error for the given path.
    pub fn persistence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::WithContext { source, .. } => source.is_validation(),
            _ => false,
        }
    }

    /// Stable snake_case tag for result documents.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ServiceRejected(_) => "service_rejected",
            Self::ServiceUnreachable(_) => "service_unreachable",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Persistence { .. } => "persistence",
            Self::WithContext { source, .. } => source.kind(),
        }
    }
}
