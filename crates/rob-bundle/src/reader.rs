//! Read-only inspection of sealed archives.
//!
//! [`ArchiveReader`] reads the manifest and individual entries straight from
//! the zip without building a working tree. Use [`crate::BundleArchiver`] to
//! get an editable bundle instead.

use crate::archiver::read_manifest;
use crate::codec::{decode_reference_marker, SlotKind};
use crate::manifest::{BundleManifest, SlotEntry, BUNDLE_SCHEMA_VERSION};
use crate::{BundleError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Reader for sealed bundle archives with checksum verification.
pub struct ArchiveReader<R: Read + Seek> {
    manifest: BundleManifest,
    archive: ZipArchive<R>,
    verified: HashMap<String, bool>,
}

impl ArchiveReader<File> {
    /// Open an archive from a file path.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BundleError::NotFound(path.display().to_string()));
        }
        Self::from_reader(File::open(path)?)
    }
}

impl ArchiveReader<Cursor<Vec<u8>>> {
    /// Open an archive from bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| BundleError::CorruptArchive(format!("not a zip archive: {}", e)))?;
        let manifest = read_manifest(&mut archive)?;

        if manifest.bundle_version != BUNDLE_SCHEMA_VERSION {
            warn!(
                bundle_version = %manifest.bundle_version,
                supported = %BUNDLE_SCHEMA_VERSION,
                "Bundle version mismatch"
            );
        }

        info!(
            bundle_id = %manifest.bundle_id,
            slots = manifest.entry_count(),
            "Archive opened for inspection"
        );

        Ok(Self {
            manifest,
            archive,
            verified: HashMap::new(),
        })
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Manifest entries in tree order.
    pub fn entries(&self) -> &[SlotEntry] {
        &self.manifest.entries
    }

    pub fn has_slot(&self, path: &str) -> bool {
        self.manifest.find_entry(path).is_some()
    }

    /// Read the stored bytes behind a manifest entry and check its checksum.
    fn read_entry(&mut self, entry: &SlotEntry) -> Result<Vec<u8>> {
        let name = entry.archive_name();
        let mut file = self
            .archive
            .by_name(&name)
            .map_err(|_| BundleError::CorruptArchive(format!("missing entry '{}'", name)))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if !entry.verify(&data) {
            return Err(BundleError::CorruptArchive(format!(
                "checksum mismatch for '{}': expected {}, got {}",
                entry.path,
                entry.sha256.as_deref().unwrap_or("none"),
                SlotEntry::compute_checksum(&data)
            )));
        }

        self.verified.insert(entry.path.clone(), true);
        debug!(path = %entry.path, bytes = data.len(), "Slot verified");
        Ok(data)
    }

    fn entry(&self, path: &str) -> Result<SlotEntry> {
        self.manifest
            .find_entry(path)
            .cloned()
            .ok_or_else(|| BundleError::NotFound(path.to_string()))
    }

    /// Read a literal slot with checksum verification.
    pub fn read_verified(&mut self, path: &str) -> Result<Vec<u8>> {
        let entry = self.entry(path)?;
        if !entry.kind.is_value() {
            return Err(BundleError::NotAValue(path.to_string()));
        }
        self.read_entry(&entry)
    }

    /// Read the target of a reference slot.
    pub fn read_reference(&mut self, path: &str) -> Result<String> {
        let entry = self.entry(path)?;
        if entry.kind != SlotKind::Reference {
            return Err(BundleError::NotAReference(path.to_string()));
        }
        let marker = self.read_entry(&entry)?;
        decode_reference_marker(&marker)
    }

    pub fn is_verified(&self, path: &str) -> bool {
        self.verified.get(path).copied().unwrap_or(false)
    }

    /// Verify every file and marker in the archive.
    ///
    /// Returns the slot paths that failed verification.
    pub fn verify_all(&mut self) -> Vec<String> {
        let mut failures = Vec::new();

        let entries: Vec<SlotEntry> = self
            .manifest
            .entries
            .iter()
            .filter(|e| e.kind != SlotKind::Directory)
            .cloned()
            .collect();

        for entry in entries {
            if let Err(e) = self.read_entry(&entry) {
                warn!(path = %entry.path, error = %e, "Verification failed");
                failures.push(entry.path);
            }
        }

        if failures.is_empty() {
            info!("All slots verified");
        } else {
            warn!(failures = ?failures, "Some slots failed verification");
        }

        failures
    }
}
