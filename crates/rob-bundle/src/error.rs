//! Error types for bundle operations.

use thiserror::Error;

/// Errors that can occur during bundle operations.
#[derive(Error, Debug)]
pub enum BundleError {
    /// The bundle has been sealed or closed.
    #[error("bundle is closed")]
    BundleClosed,

    /// Missing slot, path, or archive.
    #[error("not found: {0}")]
    NotFound(String),

    /// Slot/directory conflict, or a target that may not be replaced.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Slot holds a reference or is a directory.
    #[error("not a value: {0}")]
    NotAValue(String),

    /// Slot holds literal content or is a directory.
    #[error("not a reference: {0}")]
    NotAReference(String),

    /// Slot exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Malformed archive on open.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// Slot path fails validation.
    #[error("invalid slot path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Reference target is not an absolute URI, or is too long.
    #[error("invalid URI '{0}': must be absolute and at most 32 KiB")]
    InvalidUri(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Slot content is not valid UTF-8.
    #[error("slot content is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl BundleError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        BundleError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;
