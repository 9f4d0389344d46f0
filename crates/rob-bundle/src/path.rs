//! Slot paths and tree resolution.
//!
//! A [`SlotPath`] is a validated sequence of segments such as `inputs/in1`.
//! Paths order lexically segment by segment, so a parent always sorts before
//! its children and siblings sort by name. Listing and walking rely on that.

use crate::codec::{SlotContent, SlotKind};
use crate::manifest::{METADATA_DIR, MIMETYPE_FILE_NAME};
use crate::store::Bundle;
use crate::{BundleError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Validated logical path of a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotPath {
    segments: Vec<String>,
}

impl SlotPath {
    /// The bundle root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated path. Leading and trailing slashes are ignored;
    /// `""` and `"/"` are the root.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::from_segments(trimmed.split('/'))
    }

    /// Build a path from individual segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        let display = segments.join("/");

        for segment in &segments {
            validate_segment(&display, segment)?;
        }

        match segments.first().map(String::as_str) {
            Some(METADATA_DIR) => {
                return Err(BundleError::invalid_path(
                    display,
                    "the .ro directory is reserved for bundle metadata",
                ));
            }
            Some(MIMETYPE_FILE_NAME) if segments.len() == 1 => {
                return Err(BundleError::invalid_path(
                    display,
                    "the root mimetype entry is reserved",
                ));
            }
            _ => {}
        }

        Ok(Self { segments })
    }

    /// Whether this is the bundle root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (0 for the root).
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<SlotPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment.
    pub fn join(&self, segment: &str) -> Result<SlotPath> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self::from_segments(segments)
    }

    /// Sibling path with `suffix` appended to the last segment.
    pub(crate) fn with_suffix(&self, suffix: &str) -> Option<SlotPath> {
        let mut segments = self.segments.clone();
        let last = segments.last_mut()?;
        last.push_str(suffix);
        Some(Self { segments })
    }

    /// Sibling path with `suffix` removed from the last segment, if present.
    pub(crate) fn strip_suffix(&self, suffix: &str) -> Option<SlotPath> {
        let name = self.name()?.strip_suffix(suffix)?;
        if name.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        *segments.last_mut()? = name.to_string();
        Some(Self { segments })
    }

    /// Proper ancestors excluding the root, outermost first.
    pub fn ancestors(&self) -> Vec<SlotPath> {
        (1..self.segments.len())
            .map(|n| Self {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// Whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &SlotPath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Physical location of this slot under a working root.
    pub(crate) fn to_physical(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }
}

impl fmt::Display for SlotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.segments.join("/"))
        }
    }
}

impl std::str::FromStr for SlotPath {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_segment(display: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(BundleError::invalid_path(display, "empty segment"));
    }
    if segment == "." || segment == ".." {
        return Err(BundleError::invalid_path(
            display,
            format!("relative segment '{}'", segment),
        ));
    }
    if segment.contains(['/', '\\', '\0']) {
        return Err(BundleError::invalid_path(
            display,
            "segment contains a separator or NUL",
        ));
    }
    Ok(())
}

/// Anything that can name a slot.
pub trait IntoSlotPath {
    fn into_slot_path(self) -> Result<SlotPath>;
}

impl IntoSlotPath for SlotPath {
    fn into_slot_path(self) -> Result<SlotPath> {
        Ok(self)
    }
}

impl IntoSlotPath for &SlotPath {
    fn into_slot_path(self) -> Result<SlotPath> {
        Ok(self.clone())
    }
}

impl IntoSlotPath for &str {
    fn into_slot_path(self) -> Result<SlotPath> {
        SlotPath::parse(self)
    }
}

impl IntoSlotPath for String {
    fn into_slot_path(self) -> Result<SlotPath> {
        SlotPath::parse(&self)
    }
}

impl IntoSlotPath for &String {
    fn into_slot_path(self) -> Result<SlotPath> {
        SlotPath::parse(self)
    }
}

/// A resolved slot: its path and kind at the time of resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHandle {
    path: SlotPath,
    kind: SlotKind,
}

impl SlotHandle {
    pub(crate) fn new(path: SlotPath, kind: SlotKind) -> Self {
        Self { path, kind }
    }

    pub fn path(&self) -> &SlotPath {
        &self.path
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Last path segment (`"/"` for the root).
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or("/")
    }

    pub fn is_directory(&self) -> bool {
        self.kind == SlotKind::Directory
    }

    pub fn is_value(&self) -> bool {
        self.kind.is_value()
    }

    pub fn is_reference(&self) -> bool {
        self.kind == SlotKind::Reference
    }
}

impl Bundle {
    /// Look up an existing slot. Never creates anything.
    pub fn resolve(&self, path: impl IntoSlotPath) -> Result<SlotHandle> {
        self.ensure_open()?;
        let path = path.into_slot_path()?;
        let kind = self.kind_of(&path).ok_or_else(|| BundleError::NotFound(path.to_string()))?;
        Ok(SlotHandle::new(path, kind))
    }

    /// Whether a slot exists at `path`.
    pub fn exists(&self, path: impl IntoSlotPath) -> Result<bool> {
        self.ensure_open()?;
        let path = path.into_slot_path()?;
        Ok(self.kind_of(&path).is_some())
    }

    /// Ensure a directory and all of its ancestors exist.
    ///
    /// Fails with `AlreadyExists` if the path or any ancestor is occupied by a
    /// non-directory slot. Existing directories are left untouched.
    pub fn create_directory(&mut self, path: impl IntoSlotPath) -> Result<SlotHandle> {
        self.ensure_open()?;
        let path = path.into_slot_path()?;
        if path.is_root() {
            return Ok(SlotHandle::new(path, SlotKind::Directory));
        }

        match self.kind_of(&path) {
            Some(SlotKind::Directory) => {
                return Ok(SlotHandle::new(path, SlotKind::Directory));
            }
            Some(_) => return Err(BundleError::AlreadyExists(path.to_string())),
            None => {}
        }
        if self.marker_conflict(&path) {
            return Err(BundleError::AlreadyExists(path.to_string()));
        }

        let created = self.ensure_parent_dirs(&path)?;
        let physical = path.to_physical(self.working_root()?);
        if let Err(e) = std::fs::create_dir(physical) {
            self.discard_dirs(created);
            return Err(e.into());
        }
        self.slots.insert(path.clone(), SlotContent::Directory);
        debug!(slot = %path, "Created directory");

        Ok(SlotHandle::new(path, SlotKind::Directory))
    }

    /// Children of a directory, one level deep, ordered by segment name.
    pub fn list(&self, directory: impl IntoSlotPath) -> Result<Vec<SlotHandle>> {
        self.ensure_open()?;
        let directory = directory.into_slot_path()?;

        match self.kind_of(&directory) {
            Some(SlotKind::Directory) => {}
            Some(_) => return Err(BundleError::NotADirectory(directory.to_string())),
            None => return Err(BundleError::NotFound(directory.to_string())),
        }

        let child_depth = directory.depth() + 1;
        Ok(self
            .slots
            .range(directory.clone()..)
            .take_while(|(path, _)| path.starts_with(&directory))
            .filter(|(path, _)| path.depth() == child_depth)
            .map(|(path, content)| SlotHandle::new(path.clone(), content.kind()))
            .collect())
    }

    /// Every slot in the bundle (root excluded), parents before children.
    pub fn walk(&self) -> Result<Vec<SlotHandle>> {
        self.ensure_open()?;
        Ok(self
            .slots
            .iter()
            .map(|(path, content)| SlotHandle::new(path.clone(), content.kind()))
            .collect())
    }

    /// Kind of the slot at `path`; the root is always a directory.
    pub(crate) fn kind_of(&self, path: &SlotPath) -> Option<SlotKind> {
        if path.is_root() {
            return Some(SlotKind::Directory);
        }
        self.slots.get(path).map(SlotContent::kind)
    }

    /// Create missing ancestors of `path`, failing if one is not a directory.
    ///
    /// Returns the directories that were created, outermost first. On error
    /// nothing created by this call is left behind.
    pub(crate) fn ensure_parent_dirs(&mut self, path: &SlotPath) -> Result<Vec<SlotPath>> {
        let mut created = Vec::new();
        for ancestor in path.ancestors() {
            let step = match self.kind_of(&ancestor) {
                Some(SlotKind::Directory) => continue,
                Some(_) => Err(BundleError::AlreadyExists(ancestor.to_string())),
                None if self.marker_conflict(&ancestor) => {
                    Err(BundleError::AlreadyExists(ancestor.to_string()))
                }
                None => self.working_root().and_then(|root| {
                    std::fs::create_dir(ancestor.to_physical(root)).map_err(BundleError::from)
                }),
            };
            if let Err(e) = step {
                self.discard_dirs(created);
                return Err(e);
            }
            self.slots.insert(ancestor.clone(), SlotContent::Directory);
            debug!(slot = %ancestor, "Created directory on demand");
            created.push(ancestor);
        }
        Ok(created)
    }

    /// Remove directories created on demand by a write that then failed.
    pub(crate) fn discard_dirs(&mut self, created: Vec<SlotPath>) {
        for dir in created.into_iter().rev() {
            self.slots.remove(&dir);
            if let Ok(root) = self.working_root() {
                if let Err(e) = std::fs::remove_dir(dir.to_physical(root)) {
                    warn!(slot = %dir, error = %e, "Failed to remove directory after failed write");
                }
            }
        }
    }
}
