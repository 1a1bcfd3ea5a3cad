//! Error types for the truncation engine.
//!
//! All fallible operations return [`Result`], whose error side is
//! [`IrisError`]. Configuration problems are reported as
//! [`IrisError::InvalidConfig`], missing resources as
//! [`IrisError::NotFound`], and anything escaping a merge as
//! [`IrisError::Io`].

use std::io;

use thiserror::Error;

/// The error type used throughout the crate.
#[derive(Debug, Error)]
pub enum IrisError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Invalid truncate strategy, profile or schema combination.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid argument passed to an API.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not allowed in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A required resource, file or mapping does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persisted bytes could not be decoded.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Index level failure.
    #[error("Index error: {0}")]
    Index(String),

    /// A merge step failed; carries the index being merged.
    #[error("IOError while merging index [{index}]: {message}")]
    Io { index: String, message: String },

    /// Failure inside a worker or an internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IrisError {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        IrisError::InvalidConfig(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        IrisError::InvalidArgument(msg.into())
    }

    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        IrisError::InvalidOperation(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        IrisError::NotFound(msg.into())
    }

    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        IrisError::Corruption(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        IrisError::Storage(msg.into())
    }

    pub fn index<S: Into<String>>(msg: S) -> Self {
        IrisError::Index(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        IrisError::Internal(msg.into())
    }

    /// Wrap a merge failure for `index`.
    pub fn io<I: Into<String>, S: Into<String>>(index: I, msg: S) -> Self {
        IrisError::Io {
            index: index.into(),
            message: msg.into(),
        }
    }

    /// Clone-like copy used when one stored failure has to be reported to
    /// several callers (worker pools keep the first error they saw).
    pub fn duplicate(&self) -> Self {
        match self {
            IrisError::IoError(e) => IrisError::IoError(io::Error::new(e.kind(), e.to_string())),
            IrisError::InvalidConfig(m) => IrisError::InvalidConfig(m.clone()),
            IrisError::InvalidArgument(m) => IrisError::InvalidArgument(m.clone()),
            IrisError::InvalidOperation(m) => IrisError::InvalidOperation(m.clone()),
            IrisError::NotFound(m) => IrisError::NotFound(m.clone()),
            IrisError::Corruption(m) => IrisError::Corruption(m.clone()),
            IrisError::Storage(m) => IrisError::Storage(m.clone()),
            IrisError::Index(m) => IrisError::Index(m.clone()),
            IrisError::Io { index, message } => IrisError::Io {
                index: index.clone(),
                message: message.clone(),
            },
            IrisError::Internal(m) => IrisError::Internal(m.clone()),
            IrisError::Json(e) => IrisError::Internal(format!("JSON error: {e}")),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, IrisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_carries_index() {
        let err = IrisError::io("title", "posting dump failed");
        assert_eq!(
            err.to_string(),
            "IOError while merging index [title]: posting dump failed"
        );
    }

    #[test]
    fn test_duplicate_keeps_variant() {
        let err = IrisError::not_found("bucket map");
        assert!(matches!(err.duplicate(), IrisError::NotFound(m) if m == "bucket map"));
    }
}
