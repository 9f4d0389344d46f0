//! Slot content encoding: inline values, binary streams, and references.
//!
//! The kind of every slot lives in the bundle's index as a [`SlotContent`]
//! tag. Literal content (inline or binary) is a regular file under the working
//! root; a reference has no local bytes and only becomes a marker file
//! (`<name>.url`, Internet-shortcut format) when the bundle is sealed.

use crate::path::{IntoSlotPath, SlotPath};
use crate::store::Bundle;
use crate::{BundleError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of the archive entry holding a reference marker.
pub const MARKER_SUFFIX: &str = ".url";

const MARKER_HEADER: &str = "[InternetShortcut]";
const MARKER_URL_KEY: &str = "URL=";

/// Kind of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Directory,
    InlineValue,
    BinaryStream,
    Reference,
}

impl SlotKind {
    /// True for literal content (inline or binary).
    pub fn is_value(&self) -> bool {
        matches!(self, SlotKind::InlineValue | SlotKind::BinaryStream)
    }

    /// Media type recorded in the manifest for a slot of this kind.
    pub fn media_type(&self, path: &SlotPath) -> Option<&'static str> {
        match self {
            SlotKind::Directory => None,
            SlotKind::InlineValue => Some("text/plain; charset=utf-8"),
            SlotKind::Reference => Some("application/x-url"),
            SlotKind::BinaryStream => {
                let name = path.name().unwrap_or_default();
                Some(if name.ends_with(".json") {
                    "application/json"
                } else if name.ends_with(".html") {
                    "text/html"
                } else if name.ends_with(".txt") {
                    "text/plain"
                } else {
                    "application/octet-stream"
                })
            }
        }
    }
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SlotKind::Directory => "directory",
            SlotKind::InlineValue => "inline_value",
            SlotKind::BinaryStream => "binary_stream",
            SlotKind::Reference => "reference",
        };
        write!(f, "{}", s)
    }
}

/// Index entry: the tagged content of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlotContent {
    Directory,
    Inline,
    Binary,
    Reference(String),
}

impl SlotContent {
    pub(crate) fn kind(&self) -> SlotKind {
        match self {
            SlotContent::Directory => SlotKind::Directory,
            SlotContent::Inline => SlotKind::InlineValue,
            SlotContent::Binary => SlotKind::BinaryStream,
            SlotContent::Reference(_) => SlotKind::Reference,
        }
    }
}

/// Encode a reference marker file.
pub fn encode_reference_marker(uri: &str) -> Vec<u8> {
    format!("{}\r\n{}{}\r\n", MARKER_HEADER, MARKER_URL_KEY, uri).into_bytes()
}

/// Decode a reference marker file back into its URI.
pub fn decode_reference_marker(data: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(data)
        .map_err(|_| BundleError::CorruptArchive("reference marker is not UTF-8".to_string()))?;

    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.next() != Some(MARKER_HEADER) {
        return Err(BundleError::CorruptArchive(
            "reference marker lacks [InternetShortcut] header".to_string(),
        ));
    }

    let uri = lines
        .find_map(|line| line.strip_prefix(MARKER_URL_KEY))
        .ok_or_else(|| BundleError::CorruptArchive("reference marker has no URL".to_string()))?;

    validate_uri(uri).map_err(|_| {
        BundleError::CorruptArchive(format!("reference marker URL '{}' is not absolute", uri))
    })?;
    Ok(uri.to_string())
}

/// Longest URI a reference slot may hold.
pub const MAX_URI_BYTES: usize = 32 * 1024;

/// Check that `uri` is absolute (RFC 3986 scheme followed by `:`), fits on
/// one marker line, and is no longer than [`MAX_URI_BYTES`].
pub fn validate_uri(uri: &str) -> Result<()> {
    if uri.len() > MAX_URI_BYTES {
        let head: String = uri.chars().take(48).collect();
        return Err(BundleError::InvalidUri(format!(
            "{}... ({} bytes, limit {})",
            head,
            uri.len(),
            MAX_URI_BYTES
        )));
    }
    let invalid = || BundleError::InvalidUri(uri.to_string());

    let (scheme, rest) = uri.split_once(':').ok_or_else(invalid)?;
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let scheme_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    if !starts_alpha || !scheme_ok || rest.is_empty() || uri.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}

impl Bundle {
    /// Store `text` as the inline value of a slot.
    ///
    /// Overwrites existing content and drops a previous reference. Missing
    /// parent directories are created.
    pub fn set_inline_value(&mut self, path: impl IntoSlotPath, text: &str) -> Result<()> {
        let path = path.into_slot_path()?;
        self.write_literal(&path, |physical| std::fs::write(physical, text.as_bytes()))?;
        self.slots.insert(path.clone(), SlotContent::Inline);
        debug!(slot = %path, bytes = text.len(), "Set inline value");
        Ok(())
    }

    /// Read a literal slot as UTF-8 text.
    pub fn get_inline_value(&self, path: impl IntoSlotPath) -> Result<String> {
        let bytes = self.get_bytes(path)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// True only for literal inline/binary content.
    pub fn is_value(&self, path: impl IntoSlotPath) -> Result<bool> {
        self.ensure_open()?;
        let path = path.into_slot_path()?;
        Ok(self.kind_of(&path).is_some_and(|k| k.is_value()))
    }

    /// Mark a slot as a reference to external content. Nothing is fetched.
    pub fn set_reference(&mut self, path: impl IntoSlotPath, uri: &str) -> Result<()> {
        let path = path.into_slot_path()?;
        validate_uri(uri)?;
        self.prepare_reference(&path)?;
        self.slots
            .insert(path.clone(), SlotContent::Reference(uri.to_string()));
        debug!(slot = %path, uri, "Set reference");
        Ok(())
    }

    /// Target URI of a reference slot.
    pub fn get_reference(&self, path: impl IntoSlotPath) -> Result<String> {
        self.ensure_open()?;
        let path = path.into_slot_path()?;
        match self.slots.get(&path) {
            Some(SlotContent::Reference(uri)) => Ok(uri.clone()),
            Some(_) => Err(BundleError::NotAReference(path.to_string())),
            None if path.is_root() => Err(BundleError::NotAReference(path.to_string())),
            None => Err(BundleError::NotFound(path.to_string())),
        }
    }

    /// Whether a slot is a reference.
    pub fn is_reference(&self, path: impl IntoSlotPath) -> Result<bool> {
        self.ensure_open()?;
        let path = path.into_slot_path()?;
        Ok(matches!(self.slots.get(&path), Some(SlotContent::Reference(_))))
    }

    /// Store raw bytes as a binary slot.
    pub fn set_bytes(&mut self, path: impl IntoSlotPath, data: &[u8]) -> Result<()> {
        let path = path.into_slot_path()?;
        self.write_literal(&path, |physical| std::fs::write(physical, data))?;
        self.slots.insert(path.clone(), SlotContent::Binary);
        debug!(slot = %path, bytes = data.len(), "Set binary value");
        Ok(())
    }

    /// Read the whole content of a literal slot.
    pub fn get_bytes(&self, path: impl IntoSlotPath) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open_reader(path)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Stream a literal slot's content.
    pub fn open_reader(&self, path: impl IntoSlotPath) -> Result<SlotReader<'_>> {
        let path = path.into_slot_path()?;
        let physical = self.literal_path(&path)?;
        Ok(SlotReader {
            inner: BufReader::new(File::open(physical)?),
            _bundle: PhantomData,
        })
    }

    /// Open a streaming writer for a binary slot.
    ///
    /// The slot exists (empty) as soon as the writer is opened and holds
    /// whatever has been written when the writer is dropped; call
    /// [`SlotWriter::finish`] to surface flush errors.
    pub fn open_writer(&mut self, path: impl IntoSlotPath) -> Result<SlotWriter<'_>> {
        let path = path.into_slot_path()?;
        let file = self.write_literal(&path, |physical| File::create(physical))?;
        self.slots.insert(path.clone(), SlotContent::Binary);
        debug!(slot = %path, "Opened binary stream");
        Ok(SlotWriter {
            inner: BufWriter::new(file),
            written: 0,
            _bundle: PhantomData,
        })
    }

    /// Physical file behind a literal slot.
    pub(crate) fn literal_path(&self, path: &SlotPath) -> Result<PathBuf> {
        let root = self.working_root()?;
        match self.slots.get(path) {
            Some(SlotContent::Inline | SlotContent::Binary) => Ok(path.to_physical(root)),
            Some(_) => Err(BundleError::NotAValue(path.to_string())),
            None if path.is_root() => Err(BundleError::NotAValue(path.to_string())),
            None => Err(BundleError::NotFound(path.to_string())),
        }
    }

    /// Whether `path` would share an archive entry name with a reference
    /// marker (`path` is `<x>.url` and `<x>` is a reference).
    pub(crate) fn marker_conflict(&self, path: &SlotPath) -> bool {
        path.strip_suffix(MARKER_SUFFIX)
            .is_some_and(|base| matches!(self.slots.get(&base), Some(SlotContent::Reference(_))))
    }

    /// Run `write` against the physical file of a literal slot.
    ///
    /// Parent directories are created first and removed again if `write`
    /// fails, so a failed write leaves the tree as it was.
    pub(crate) fn write_literal<T>(
        &mut self,
        path: &SlotPath,
        write: impl FnOnce(&Path) -> io::Result<T>,
    ) -> Result<T> {
        let (physical, created) = self.prepare_literal(path)?;
        match write(&physical) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.discard_dirs(created);
                Err(e.into())
            }
        }
    }

    /// Validate a literal write target and return its physical path along
    /// with any parent directories created for it.
    fn prepare_literal(&mut self, path: &SlotPath) -> Result<(PathBuf, Vec<SlotPath>)> {
        self.ensure_open()?;
        if path.is_root() {
            return Err(BundleError::AlreadyExists(path.to_string()));
        }
        if matches!(self.slots.get(path), Some(SlotContent::Directory)) || self.marker_conflict(path) {
            return Err(BundleError::AlreadyExists(path.to_string()));
        }
        let created = self.ensure_parent_dirs(path)?;
        Ok((path.to_physical(self.working_root()?), created))
    }

    /// Validate a reference target, removing literal bytes it replaces.
    fn prepare_reference(&mut self, path: &SlotPath) -> Result<()> {
        self.ensure_open()?;
        if path.is_root() || self.marker_conflict(path) {
            return Err(BundleError::AlreadyExists(path.to_string()));
        }
        let marker = path
            .with_suffix(MARKER_SUFFIX)
            .ok_or_else(|| BundleError::AlreadyExists(path.to_string()))?;
        if self.slots.contains_key(&marker) {
            return Err(BundleError::AlreadyExists(marker.to_string()));
        }

        match self.slots.get(path) {
            Some(SlotContent::Directory) => Err(BundleError::AlreadyExists(path.to_string())),
            Some(SlotContent::Inline | SlotContent::Binary) => {
                std::fs::remove_file(path.to_physical(self.working_root()?))?;
                Ok(())
            }
            Some(SlotContent::Reference(_)) => Ok(()),
            None => self.ensure_parent_dirs(path).map(|_| ()),
        }
    }
}

/// Streaming reader over a literal slot. Borrows the bundle.
pub struct SlotReader<'a> {
    inner: BufReader<File>,
    _bundle: PhantomData<&'a Bundle>,
}

impl Read for SlotReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Streaming writer into a binary slot. Mutably borrows the bundle, so no
/// other operation can run until it is finished or dropped.
pub struct SlotWriter<'a> {
    inner: BufWriter<File>,
    written: u64,
    _bundle: PhantomData<&'a mut Bundle>,
}

impl SlotWriter<'_> {
    /// Flush to disk and return the number of bytes written.
    pub fn finish(mut self) -> Result<u64> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()?;
        Ok(self.written)
    }
}

impl Write for SlotWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
