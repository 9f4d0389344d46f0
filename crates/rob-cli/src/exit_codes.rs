//! Exit codes for the `rob` CLI.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: user/input errors (fixable by changing arguments or inputs)
//! - 20-29: I/O and internal errors

use rob_bundle::BundleError;
use rob_config::ValidationError;

/// Exit codes for `rob` commands.
///
/// These codes are a stable contract for scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed.
    Ok = 0,

    // ========================================================================
    // User / Input Errors (10-19)
    // ========================================================================
    /// Invalid arguments, slot path, or URI
    ArgsError = 10,

    /// Archive, slot, or source file does not exist
    NotFound = 11,

    /// Target already exists and may not be replaced
    Conflict = 12,

    /// Slot has the wrong kind for the requested operation
    TypeMismatch = 13,

    /// Archive is malformed or fails verification
    CorruptArchive = 14,

    /// Configuration could not be loaded or is invalid
    ConfigError = 15,

    // ========================================================================
    // I/O / Internal Errors (20-29)
    // ========================================================================
    /// I/O error
    IoError = 20,

    /// Internal error (bug - please report)
    InternalError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    /// Codes 10-19, resolvable by the user.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// Error code name (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::NotFound => "ERR_NOT_FOUND",
            ExitCode::Conflict => "ERR_CONFLICT",
            ExitCode::TypeMismatch => "ERR_TYPE_MISMATCH",
            ExitCode::CorruptArchive => "ERR_CORRUPT_ARCHIVE",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::IoError => "ERR_IO",
            ExitCode::InternalError => "ERR_INTERNAL",
        }
    }
}

impl From<&BundleError> for ExitCode {
    fn from(error: &BundleError) -> Self {
        match error {
            BundleError::NotFound(_) => ExitCode::NotFound,
            BundleError::AlreadyExists(_) => ExitCode::Conflict,
            BundleError::NotAValue(_)
            | BundleError::NotAReference(_)
            | BundleError::NotADirectory(_)
            | BundleError::Utf8(_) => ExitCode::TypeMismatch,
            BundleError::CorruptArchive(_) | BundleError::Zip(_) | BundleError::Json(_) => {
                ExitCode::CorruptArchive
            }
            BundleError::InvalidPath { .. } | BundleError::InvalidUri(_) => ExitCode::ArgsError,
            BundleError::Io(_) => ExitCode::IoError,
            BundleError::BundleClosed => ExitCode::InternalError,
        }
    }
}

impl From<&ValidationError> for ExitCode {
    fn from(_: &ValidationError) -> Self {
        ExitCode::ConfigError
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
