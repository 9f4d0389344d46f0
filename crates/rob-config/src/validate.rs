//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::settings::BundleConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

/// Validate a bundle configuration semantically.
pub fn validate_config(config: &BundleConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    validate_extension(&config.archive.extension)?;

    if let Some(ref root) = config.store.temp_root {
        if root.as_os_str().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "store.temp_root".to_string(),
                message: "Must not be empty".to_string(),
            });
        }
        if root.exists() && !root.is_dir() {
            return Err(ValidationError::InvalidValue {
                field: "store.temp_root".to_string(),
                message: format!("{} exists but is not a directory", root.display()),
            });
        }
    }

    Ok(())
}

fn validate_extension(extension: &str) -> ValidationResult<()> {
    if extension.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "archive.extension".to_string(),
            message: "Must not be empty".to_string(),
        });
    }

    if extension.starts_with('.') || extension.contains('/') || extension.contains('\\') {
        return Err(ValidationError::InvalidValue {
            field: "archive.extension".to_string(),
            message: format!(
                "Must be a bare suffix without leading dot or separators, got '{}'",
                extension
            ),
        });
    }

    Ok(())
}
