//! Error types for the recall MCP gateway.

use thiserror::Error;

/// Errors that can occur in the recall MCP gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid argument value provided.
    #[error("Invalid {field}: '{value}'. Valid values: {valid_values}")]
    InvalidArgument {
        /// The field name that had an invalid value.
        field: &'static str,
        /// The invalid value that was provided.
        value: String,
        /// Description of valid values.
        valid_values: &'static str,
    },

    /// Authentication is enabled but no token was configured.
    #[error("Authentication is enabled but {0} is not set")]
    MissingAuthToken(&'static str),

    /// The operation exceeded the gateway deadline.
    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    /// An error from the recall core.
    #[error("{0}")]
    Core(#[from] recall::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for recall MCP operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is the caller's fault (maps to MCP
    /// `invalid_params`) rather than an internal failure.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        match self {
            Self::InvalidArgument { .. } => true,
            Self::Core(core) => matches!(
                core,
                recall::Error::InvalidInput { .. }
                    | recall::Error::NotFound { .. }
                    | recall::Error::Conflict { .. }
                    | recall::Error::Path(_)
            ),
            _ => false,
        }
    }
}
