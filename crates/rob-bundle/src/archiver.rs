//! Sealing bundles into zip archives and opening them again.
//!
//! Archive layout:
//! - `mimetype`: media type, first entry, stored uncompressed
//! - `.ro/manifest.json`: [`BundleManifest`]
//! - `<dir>/`: one directory entry per directory slot
//! - `<path>`: one file entry per inline/binary slot
//! - `<path>.url`: Internet-shortcut marker per reference slot
//!
//! Sealing writes to a staging file next to the destination and renames it
//! into place, so an interrupted seal never leaves a partial archive at the
//! destination.

use crate::codec::{
    decode_reference_marker, encode_reference_marker, SlotContent, SlotKind, MARKER_SUFFIX,
    MAX_URI_BYTES,
};
use crate::manifest::{
    checksum_reader, BundleManifest, HashingWriter, SlotEntry, BUNDLE_MIMETYPE, MANIFEST_FILE_NAME,
    METADATA_DIR, MIMETYPE_FILE_NAME,
};
use crate::path::SlotPath;
use crate::store::Bundle;
use crate::{BundleError, Result};
use rob_config::{BundleConfig, Compression};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

/// Upper bound on a reference marker's size: the longest URI plus the
/// shortcut header and line breaks.
const MAX_MARKER_BYTES: u64 = MAX_URI_BYTES as u64 + 64;

/// Seals and opens bundles according to a configuration.
#[derive(Debug, Clone, Default)]
pub struct BundleArchiver {
    config: BundleConfig,
}

impl BundleArchiver {
    pub fn new(config: BundleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Write the bundle to `dest` atomically, then close it.
    ///
    /// On failure the bundle stays open and any previous file at `dest` is
    /// left untouched.
    pub fn seal(&self, bundle: &mut Bundle, dest: &Path) -> Result<BundleManifest> {
        bundle.ensure_open()?;
        let manifest = build_manifest(bundle)?;

        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut staging = tempfile::Builder::new()
            .prefix(".rob-seal-")
            .suffix(".tmp")
            .tempfile_in(parent)?;

        write_archive(bundle, &manifest, self.config.archive.compression, staging.as_file_mut())?;
        staging.as_file().sync_all()?;
        staging.persist(dest).map_err(|e| BundleError::Io(e.error))?;

        close_sealed(bundle);

        info!(
            path = %dest.display(),
            bundle_id = %manifest.bundle_id,
            slots = manifest.entry_count(),
            bytes = manifest.total_bytes(),
            "Bundle sealed"
        );

        Ok(manifest)
    }

    /// Seal into memory, then close the bundle.
    pub fn seal_to_vec(&self, bundle: &mut Bundle) -> Result<(Vec<u8>, BundleManifest)> {
        bundle.ensure_open()?;
        let manifest = build_manifest(bundle)?;

        let mut buffer = Cursor::new(Vec::new());
        write_archive(bundle, &manifest, self.config.archive.compression, &mut buffer)?;
        let bytes = buffer.into_inner();

        close_sealed(bundle);

        info!(
            bundle_id = %manifest.bundle_id,
            slots = manifest.entry_count(),
            compressed_bytes = bytes.len(),
            "Bundle sealed to memory"
        );

        Ok((bytes, manifest))
    }

    /// Open an archive file as a new editable bundle.
    ///
    /// The archive itself is never modified; edits persist only through a
    /// later seal.
    pub fn open(&self, path: &Path) -> Result<Bundle> {
        if !path.is_file() {
            return Err(BundleError::NotFound(path.display().to_string()));
        }
        let bundle = self.open_reader(File::open(path)?)?;
        info!(path = %path.display(), bundle_id = %bundle.id(), "Bundle opened");
        Ok(bundle)
    }

    /// Open an in-memory archive as a new editable bundle.
    pub fn open_bytes(&self, bytes: Vec<u8>) -> Result<Bundle> {
        self.open_reader(Cursor::new(bytes))
    }

    /// Open from any `Read + Seek` source.
    pub fn open_reader<R: Read + Seek>(&self, reader: R) -> Result<Bundle> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| BundleError::CorruptArchive(format!("not a zip archive: {}", e)))?;

        check_mimetype(&mut archive)?;
        let manifest = read_manifest(&mut archive)?;

        let mut bundle = Bundle::with_identity(
            manifest.bundle_id,
            manifest.created_at,
            manifest.description.clone(),
            &self.config,
        )?;

        let mut claimed: HashSet<String> = HashSet::new();
        for entry in &manifest.entries {
            restore_entry(&mut bundle, &mut archive, entry, self.config.archive.verify_checksums)?;
            claimed.insert(entry.archive_name());
        }

        adopt_unlisted(&mut bundle, &mut archive, &claimed)?;

        debug!(
            bundle_id = %bundle.id(),
            slots = bundle.slots.len(),
            "Bundle restored"
        );
        Ok(bundle)
    }
}

impl Bundle {
    /// Seal with this bundle's own configuration. See [`BundleArchiver::seal`].
    pub fn seal(&mut self, dest: &Path) -> Result<BundleManifest> {
        BundleArchiver::new(self.config().clone()).seal(self, dest)
    }

    /// Open an archive with the default configuration.
    pub fn open(path: &Path) -> Result<Bundle> {
        BundleArchiver::default().open(path)
    }
}

/// Describe every slot, computing checksums from the working tree.
/// Close a bundle whose archive is already written. The archive is the
/// result; failing to remove the working root only warrants a warning.
fn close_sealed(bundle: &mut Bundle) {
    if let Err(e) = bundle.close() {
        warn!(
            bundle_id = %bundle.id(),
            error = %e,
            "Failed to remove working root after seal"
        );
    }
}

fn build_manifest(bundle: &Bundle) -> Result<BundleManifest> {
    let root = bundle.working_root()?;
    let mut manifest = BundleManifest::new(bundle.id(), bundle.created_at())
        .with_description(bundle.description().map(str::to_string));

    for (path, content) in &bundle.slots {
        let kind = content.kind();
        let name = path.to_string();
        let entry = match content {
            SlotContent::Directory => SlotEntry::directory(name),
            SlotContent::Inline | SlotContent::Binary => {
                let (sha256, bytes) = checksum_reader(File::open(path.to_physical(root))?)?;
                SlotEntry::file(name, kind, sha256, bytes)
            }
            SlotContent::Reference(uri) => {
                let marker = encode_reference_marker(uri);
                SlotEntry::file(name, kind, SlotEntry::compute_checksum(&marker), marker.len() as u64)
                    .with_uri(uri.clone())
            }
        };
        let entry = match kind.media_type(path) {
            Some(media_type) => entry.with_media_type(media_type),
            None => entry,
        };
        manifest.add_entry(entry);
    }

    Ok(manifest)
}

fn write_archive<W: Write + Seek>(
    bundle: &Bundle,
    manifest: &BundleManifest,
    compression: Compression,
    writer: W,
) -> Result<W> {
    let root = bundle.working_root()?;
    let method = match compression {
        Compression::Deflated => CompressionMethod::Deflated,
        Compression::Stored => CompressionMethod::Stored,
    };

    let mut zip = ZipWriter::new(writer);

    let stored: FileOptions<'_, ()> = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options: FileOptions<'_, ()> = FileOptions::default()
        .compression_method(method)
        .unix_permissions(0o644);
    let dir_options: FileOptions<'_, ()> = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o755);

    // mimetype first and uncompressed so it can be sniffed at a fixed offset
    zip.start_file(MIMETYPE_FILE_NAME, stored)?;
    zip.write_all(BUNDLE_MIMETYPE.as_bytes())?;

    zip.add_directory(format!("{}/", METADATA_DIR), dir_options)?;
    zip.start_file(MANIFEST_FILE_NAME, options)?;
    zip.write_all(manifest.to_json()?.as_bytes())?;

    for (path, content) in &bundle.slots {
        let name = path.to_string();
        match content {
            SlotContent::Directory => {
                zip.add_directory(format!("{}/", name), dir_options)?;
            }
            SlotContent::Inline | SlotContent::Binary => {
                zip.start_file(name, options)?;
                let mut file = File::open(path.to_physical(root))?;
                io::copy(&mut file, &mut zip)?;
            }
            SlotContent::Reference(uri) => {
                zip.start_file(format!("{}{}", name, MARKER_SUFFIX), options)?;
                zip.write_all(&encode_reference_marker(uri))?;
            }
        }
    }

    Ok(zip.finish()?)
}

fn check_mimetype<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<()> {
    let mut entry = match archive.by_name(MIMETYPE_FILE_NAME) {
        Ok(entry) => entry,
        Err(_) => {
            warn!("Archive has no mimetype entry");
            return Ok(());
        }
    };

    let mut mimetype = String::new();
    entry
        .by_ref()
        .take(1024)
        .read_to_string(&mut mimetype)
        .map_err(|e| BundleError::CorruptArchive(format!("unreadable mimetype: {}", e)))?;
    if mimetype.trim() != BUNDLE_MIMETYPE {
        warn!(mimetype = %mimetype.trim(), expected = BUNDLE_MIMETYPE, "Unexpected bundle mimetype");
    }
    Ok(())
}

/// Read and validate the manifest from an archive.
pub(crate) fn read_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<BundleManifest> {
    let mut manifest_file = archive.by_name(MANIFEST_FILE_NAME).map_err(|_| {
        BundleError::CorruptArchive(format!("missing {}", MANIFEST_FILE_NAME))
    })?;

    let mut json = String::new();
    manifest_file
        .read_to_string(&mut json)
        .map_err(|e| BundleError::CorruptArchive(format!("unreadable manifest: {}", e)))?;

    let manifest = BundleManifest::from_json(&json)
        .map_err(|e| BundleError::CorruptArchive(format!("invalid manifest: {}", e)))?;
    manifest.validate()?;
    Ok(manifest)
}

fn parse_entry_path(name: &str) -> Result<SlotPath> {
    let path = SlotPath::parse(name)
        .map_err(|e| BundleError::CorruptArchive(format!("bad entry name '{}': {}", name, e)))?;
    if path.is_root() {
        return Err(BundleError::CorruptArchive(format!(
            "entry '{}' names the root",
            name
        )));
    }
    Ok(path)
}

/// Reconstruct one manifest entry in the working tree.
fn restore_entry<R: Read + Seek>(
    bundle: &mut Bundle,
    archive: &mut ZipArchive<R>,
    entry: &SlotEntry,
    verify: bool,
) -> Result<()> {
    let path = parse_entry_path(&entry.path)?;
    let conflict = |e: BundleError| match e {
        BundleError::AlreadyExists(p) => {
            BundleError::CorruptArchive(format!("slot '{}' conflicts with '{}'", entry.path, p))
        }
        other => other,
    };

    let content = match entry.kind {
        SlotKind::Directory => {
            // already created as the parent of an earlier entry
            if bundle.kind_of(&path) == Some(SlotKind::Directory) {
                return Ok(());
            }
            return bundle
                .insert_restored(path, SlotContent::Directory)
                .map_err(conflict);
        }
        SlotKind::InlineValue => SlotContent::Inline,
        SlotKind::BinaryStream => SlotContent::Binary,
        SlotKind::Reference => {
            let name = entry.archive_name();
            let mut marker = Vec::new();
            archive
                .by_name(&name)
                .map_err(|_| BundleError::CorruptArchive(format!("missing entry '{}'", name)))?
                .take(MAX_MARKER_BYTES)
                .read_to_end(&mut marker)?;

            if verify && !entry.verify(&marker) {
                return Err(checksum_mismatch(entry, SlotEntry::compute_checksum(&marker)));
            }
            let uri = decode_reference_marker(&marker)?;
            if Some(uri.as_str()) != entry.uri.as_deref() {
                return Err(BundleError::CorruptArchive(format!(
                    "reference '{}' marker does not match manifest URI",
                    entry.path
                )));
            }
            return bundle
                .insert_restored(path, SlotContent::Reference(uri))
                .map_err(conflict);
        }
    };

    bundle
        .insert_restored(path.clone(), content)
        .map_err(conflict)?;

    let mut source = archive
        .by_name(&entry.path)
        .map_err(|_| BundleError::CorruptArchive(format!("missing entry '{}'", entry.path)))?;
    let file = File::create(path.to_physical(bundle.working_root()?))?;
    let mut writer = HashingWriter::new(file);
    io::copy(&mut source, &mut writer)
        .map_err(|e| BundleError::CorruptArchive(format!("unreadable entry '{}': {}", entry.path, e)))?;
    let (_, sha256, bytes) = writer.finish()?;

    if verify && (entry.sha256.as_deref() != Some(sha256.as_str()) || entry.bytes != bytes) {
        return Err(checksum_mismatch(entry, sha256));
    }
    Ok(())
}

fn checksum_mismatch(entry: &SlotEntry, actual: String) -> BundleError {
    BundleError::CorruptArchive(format!(
        "checksum mismatch for '{}': expected {}, got {}",
        entry.path,
        entry.sha256.as_deref().unwrap_or("none"),
        actual
    ))
}

/// Adopt zip entries the manifest does not mention as plain slots.
fn adopt_unlisted<R: Read + Seek>(
    bundle: &mut Bundle,
    archive: &mut ZipArchive<R>,
    claimed: &HashSet<String>,
) -> Result<()> {
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();

    for name in names {
        if name == MIMETYPE_FILE_NAME
            || name.starts_with(&format!("{}/", METADATA_DIR))
            || claimed.contains(&name)
        {
            continue;
        }

        let path = parse_entry_path(&name)?;
        if name.ends_with('/') {
            if bundle.kind_of(&path) == Some(SlotKind::Directory) {
                continue;
            }
            bundle
                .insert_restored(path, SlotContent::Directory)
                .map_err(|e| BundleError::CorruptArchive(format!("entry '{}': {}", name, e)))?;
            continue;
        }

        warn!(entry = %name, "Adopting entry missing from manifest as binary slot");
        bundle
            .insert_restored(path.clone(), SlotContent::Binary)
            .map_err(|e| BundleError::CorruptArchive(format!("entry '{}': {}", name, e)))?;
        let mut source = archive.by_name(&name)?;
        let mut file = File::create(path.to_physical(bundle.working_root()?))?;
        io::copy(&mut source, &mut file)?;
    }

    Ok(())
}
