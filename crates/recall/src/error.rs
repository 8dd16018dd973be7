//! Error types for recall core operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Path and configuration resolution errors.
#[derive(Debug, Error)]
pub enum PathError {
    /// A path component was rejected by the sandbox rules.
    #[error("Invalid path component '{component}': {reason}")]
    InvalidComponent {
        /// The offending component.
        component: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A configured path attempted to resolve outside its sandbox
    /// anchor (parent-directory traversal in a root setting).
    #[error("Path '{path}' resolves outside the configured root '{root}'")]
    OutsideSandbox {
        /// The offending path.
        path: String,
        /// The sandbox root it escaped.
        root: String,
    },

    /// The total path exceeded the length cap.
    #[error("Path exceeds the maximum length of {max} bytes")]
    TooLong {
        /// The configured cap.
        max: usize,
    },

    /// The path exceeded the depth cap.
    #[error("Path exceeds the maximum depth of {max} components")]
    TooDeep {
        /// The configured cap.
        max: usize,
    },

    /// A root directory could not be created.
    #[error("Permission denied creating '{path}': {source}")]
    PermissionDenied {
        /// The directory that could not be created.
        path: String,
        /// The underlying IO error.
        source: io::Error,
    },
}

/// The error type for recall operations.
///
/// Variants follow the externally documented failure taxonomy, plus
/// carriers for path, IO and JSON failures; the tool gateway converts
/// them into typed results.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed schema validation (unknown enum value, bad field).
    #[error("Invalid {field}: {reason}")]
    InvalidInput {
        /// The field that failed validation.
        field: &'static str,
        /// Why the value was invalid.
        reason: String,
    },

    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// "memory" or "task".
        kind: &'static str,
        /// The missing id.
        id: String,
    },

    /// An id or filename collision could not be resolved.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// "memory" or "task".
        kind: &'static str,
        /// The colliding id or filename.
        id: String,
    },

    /// An illegal task status transition was requested.
    #[error("Illegal status transition: {from} -> {to}")]
    Conflict {
        /// The current status.
        from: String,
        /// The requested status.
        to: String,
    },

    /// An existing file could not be parsed as an entity.
    #[error("Corrupt entity file '{file}': {reason}")]
    Corrupt {
        /// The unparseable file.
        file: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The operation exceeded its deadline. Partial writes not yet
    /// committed via atomic rename have been discarded.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// The operation that was cancelled.
        operation: &'static str,
    },

    /// An optional subsystem is unavailable. Returned by capability
    /// probes (the vector index); callers log once and proceed with a
    /// no-op replacement.
    #[error("Subsystem unavailable: {subsystem}")]
    Degraded {
        /// The degraded subsystem.
        subsystem: &'static str,
    },

    /// An unexpected internal failure. An emergency backup is taken
    /// before this surfaces.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Path or configuration error.
    #[error("{0}")]
    Path(#[from] PathError),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an [`Error::InvalidInput`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for a memory [`Error::NotFound`].
    pub fn memory_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "memory",
            id: id.into(),
        }
    }

    /// Shorthand for a task [`Error::NotFound`].
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "task",
            id: id.into(),
        }
    }

    /// Whether this error is transient enough to retry. The coalesced
    /// write flusher uses this to decide between retrying a failed
    /// flush and dropping it: permanent failures (permissions, missing
    /// directories) are not worth a second attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(e) if matches!(
            e.kind(),
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ))
    }
}

/// A specialized Result type for recall operations.
pub type Result<T> = std::result::Result<T, Error>;
