//! Typed configuration for bundle archives and working trees.
//!
//! Every field has a built-in default, so an empty `{}` file is a valid
//! configuration and a missing file behaves the same as the defaults.

use crate::validate::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compression applied to slot entries when a bundle is sealed.
///
/// The `mimetype` entry is always stored uncompressed regardless of this
/// setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Deflate (zip method 8).
    #[default]
    Deflated,
    /// No compression (zip method 0).
    Stored,
}

impl Compression {
    /// Parse from string.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deflated" | "deflate" => Some(Compression::Deflated),
            "stored" | "store" | "none" => Some(Compression::Stored),
            _ => None,
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Compression::Deflated => "deflated",
            Compression::Stored => "stored",
        };
        write!(f, "{}", s)
    }
}

/// What to do when a copy targets something that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Replace the existing content.
    Replace,
    /// Fail with an "already exists" error.
    #[default]
    FailIfExists,
}

impl OverwritePolicy {
    /// Whether existing targets may be replaced.
    pub fn allows_replace(&self) -> bool {
        matches!(self, OverwritePolicy::Replace)
    }
}

impl std::fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OverwritePolicy::Replace => "replace",
            OverwritePolicy::FailIfExists => "fail_if_exists",
        };
        write!(f, "{}", s)
    }
}

/// Archive (seal/open) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Compression method for slot entries.
    pub compression: Compression,

    /// Verify SHA-256 checksums of every entry when opening an archive.
    pub verify_checksums: bool,

    /// Conventional file extension for sealed bundles (without leading dot).
    pub extension: String,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            compression: Compression::Deflated,
            verify_checksums: true,
            extension: "bundle.zip".to_string(),
        }
    }
}

/// Working-tree settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory in which per-bundle temporary roots are created.
    /// `None` uses the system temp directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,

    /// Default policy for copies into and out of a bundle.
    pub overwrite: OverwritePolicy,
}

/// Top-level configuration file (`config.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Schema version of this file.
    pub schema_version: String,

    /// Archive settings.
    pub archive: ArchiveSettings,

    /// Working-tree settings.
    pub store: StoreSettings,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            archive: ArchiveSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

impl BundleConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_json(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn parse_json(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> ValidationResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ValidationError::ParseError(format!("Serialize failed: {}", e)))
    }

    /// Set the working-tree root directory.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store.temp_root = Some(root.into());
        self
    }

    /// Set the archive compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.archive.compression = compression;
        self
    }
}
