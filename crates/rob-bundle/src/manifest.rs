//! Bundle manifest types and serialization.
//!
//! The manifest (`.ro/manifest.json`) is the source of truth for a sealed
//! bundle's contents, providing:
//! - Bundle metadata (version, identifier, timestamps)
//! - One entry per slot with its kind, size, and SHA-256 checksum
//! - The target URI of every reference slot

use crate::codec::SlotKind;
use crate::{BundleError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::{self, Read, Write};
use uuid::Uuid;

/// Current bundle schema version.
pub const BUNDLE_SCHEMA_VERSION: &str = "1.0.0";

/// Metadata directory inside the archive.
pub const METADATA_DIR: &str = ".ro";

/// Manifest file name within the archive.
pub const MANIFEST_FILE_NAME: &str = ".ro/manifest.json";

/// Name of the leading, uncompressed media-type entry.
pub const MIMETYPE_FILE_NAME: &str = "mimetype";

/// Media type written to the `mimetype` entry.
pub const BUNDLE_MIMETYPE: &str = "application/vnd.wf4ever.robundle+zip";

/// Bundle manifest containing metadata and slot checksums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Bundle format version.
    pub bundle_version: String,

    /// Stable identifier of the bundle, kept across reopen/reseal.
    pub bundle_id: Uuid,

    /// When the bundle was first created.
    pub created_at: DateTime<Utc>,

    /// When this archive was sealed.
    pub sealed_at: DateTime<Utc>,

    /// Tool that wrote the archive.
    pub generator: String,

    /// Optional description or notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Slots in the bundle, in tree order.
    pub entries: Vec<SlotEntry>,
}

impl BundleManifest {
    /// Create a new manifest with required fields.
    pub fn new(bundle_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            bundle_version: BUNDLE_SCHEMA_VERSION.to_string(),
            bundle_id,
            created_at,
            sealed_at: Utc::now(),
            generator: format!("rob-bundle/{}", env!("CARGO_PKG_VERSION")),
            description: None,
            entries: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Add a slot entry to the manifest.
    pub fn add_entry(&mut self, entry: SlotEntry) {
        self.entries.push(entry);
    }

    /// Get total size of all archived files in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.bytes).sum()
    }

    /// Get slot count (directories included).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Find a slot entry by path.
    pub fn find_entry(&self, path: &str) -> Option<&SlotEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Validate the manifest structure.
    pub fn validate(&self) -> Result<()> {
        let major = self.bundle_version.split('.').next().unwrap_or_default();
        let supported = BUNDLE_SCHEMA_VERSION.split('.').next().unwrap_or_default();
        if major != supported {
            return Err(BundleError::CorruptArchive(format!(
                "unsupported bundle version {} (supported: {})",
                self.bundle_version, BUNDLE_SCHEMA_VERSION
            )));
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.path.is_empty() {
                return Err(corrupt("entry has empty path"));
            }
            if !seen.insert(entry.path.as_str()) {
                return Err(corrupt(format!("duplicate entry '{}'", entry.path)));
            }

            match entry.kind {
                SlotKind::Directory => {
                    if entry.sha256.is_some() || entry.uri.is_some() {
                        return Err(corrupt(format!(
                            "directory '{}' carries content fields",
                            entry.path
                        )));
                    }
                }
                SlotKind::InlineValue | SlotKind::BinaryStream | SlotKind::Reference => {
                    let valid = entry
                        .sha256
                        .as_deref()
                        .is_some_and(|s| s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()));
                    if !valid {
                        return Err(corrupt(format!(
                            "entry '{}' has invalid checksum",
                            entry.path
                        )));
                    }
                    if entry.kind == SlotKind::Reference && entry.uri.is_none() {
                        return Err(corrupt(format!("reference '{}' has no URI", entry.path)));
                    }
                }
            }
        }

        Ok(())
    }

    /// Serialize to JSON with consistent formatting.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn corrupt(message: impl Into<String>) -> BundleError {
    BundleError::CorruptArchive(format!("manifest: {}", message.into()))
}

/// Slot entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    /// Slot path within the bundle (`/`-separated, no leading slash).
    pub path: String,

    /// Slot kind.
    pub kind: SlotKind,

    /// Size in bytes of the archived file (marker size for references).
    pub bytes: u64,

    /// SHA-256 checksum of the archived file (64 hex characters).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Target of a reference slot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Media type (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl SlotEntry {
    /// Entry for a directory slot.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: SlotKind::Directory,
            bytes: 0,
            sha256: None,
            uri: None,
            media_type: None,
        }
    }

    /// Entry for a slot backed by an archived file.
    pub fn file(path: impl Into<String>, kind: SlotKind, sha256: impl Into<String>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            bytes,
            sha256: Some(sha256.into()),
            uri: None,
            media_type: None,
        }
    }

    /// Set the reference URI.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Name of the zip entry that stores this slot.
    pub fn archive_name(&self) -> String {
        match self.kind {
            SlotKind::Directory => format!("{}/", self.path),
            SlotKind::Reference => format!("{}{}", self.path, crate::codec::MARKER_SUFFIX),
            SlotKind::InlineValue | SlotKind::BinaryStream => self.path.clone(),
        }
    }

    /// Compute SHA-256 checksum of data.
    pub fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Verify the checksum against data.
    pub fn verify(&self, data: &[u8]) -> bool {
        self.sha256.as_deref() == Some(Self::compute_checksum(data).as_str())
    }
}

/// Stream a reader through SHA-256, returning `(hex digest, byte count)`.
pub(crate) fn checksum_reader<R: Read>(mut reader: R) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let bytes = io::copy(&mut reader, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), bytes))
}

/// Writer adapter that hashes everything passing through it.
pub(crate) struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Flush and return `(inner, hex digest, byte count)`.
    pub(crate) fn finish(mut self) -> io::Result<(W, String, u64)> {
        self.inner.flush()?;
        Ok((self.inner, hex::encode(self.hasher.finalize()), self.bytes))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
