//! The bundle working tree.
//!
//! A [`Bundle`] owns a private temporary directory that mirrors its literal
//! slots as plain files, plus an ordered index of slot kinds. The directory is
//! removed when the bundle is sealed, closed, or dropped.

use crate::codec::{SlotContent, MARKER_SUFFIX};
use crate::path::{IntoSlotPath, SlotPath};
use crate::{BundleError, Result};
use chrono::{DateTime, Utc};
use rob_config::{BundleConfig, OverwritePolicy};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};
use uuid::Uuid;

/// Prefix of per-bundle temporary roots.
const WORKDIR_PREFIX: &str = "robundle-";

/// An editable bundle.
#[derive(Debug)]
pub struct Bundle {
    id: Uuid,
    created_at: DateTime<Utc>,
    description: Option<String>,
    config: BundleConfig,
    /// `None` once the bundle is closed.
    workdir: Option<TempDir>,
    pub(crate) slots: BTreeMap<SlotPath, SlotContent>,
}

impl Bundle {
    /// Create an empty bundle with the default configuration.
    pub fn create() -> Result<Self> {
        Self::create_with(&BundleConfig::default())
    }

    /// Create an empty bundle.
    pub fn create_with(config: &BundleConfig) -> Result<Self> {
        let bundle = Self::with_identity(Uuid::new_v4(), Utc::now(), None, config)?;
        info!(
            bundle_id = %bundle.id,
            root = %bundle.working_root()?.display(),
            "Bundle created"
        );
        Ok(bundle)
    }

    /// Empty bundle with a fresh working root and the given identity.
    pub(crate) fn with_identity(
        id: Uuid,
        created_at: DateTime<Utc>,
        description: Option<String>,
        config: &BundleConfig,
    ) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);
        let workdir = match config.store.temp_root {
            Some(ref root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        Ok(Self {
            id,
            created_at,
            description,
            config: config.clone(),
            workdir: Some(workdir),
            slots: BTreeMap::new(),
        })
    }

    /// Unique bundle identifier, preserved across seal and open.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the bundle was first created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the description written to the manifest on seal.
    pub fn set_description(&mut self, description: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.description = Some(description.into());
        Ok(())
    }

    /// Configuration this bundle was created or opened with.
    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.workdir.is_some()
    }

    /// Temporary directory backing the working tree.
    pub fn working_root(&self) -> Result<&Path> {
        self.workdir
            .as_ref()
            .map(TempDir::path)
            .ok_or(BundleError::BundleClosed)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BundleError::BundleClosed)
        }
    }

    /// Copy a file from the filesystem into a slot, recorded as a binary
    /// stream. Returns the number of bytes copied.
    pub fn copy_in(
        &mut self,
        source: &Path,
        dest: impl IntoSlotPath,
        policy: OverwritePolicy,
    ) -> Result<u64> {
        self.ensure_open()?;
        let dest = dest.into_slot_path()?;

        if !source.is_file() {
            return Err(BundleError::NotFound(source.display().to_string()));
        }
        if self.kind_of(&dest).is_some() && !policy.allows_replace() {
            return Err(BundleError::AlreadyExists(dest.to_string()));
        }

        let bytes = self.write_literal(&dest, |physical| std::fs::copy(source, physical))?;
        self.slots.insert(dest.clone(), SlotContent::Binary);

        debug!(slot = %dest, source = %source.display(), bytes, "Copied into bundle");
        Ok(bytes)
    }

    /// Copy a literal slot out to a filesystem path. Parent directories of
    /// `dest` are not created. Returns the number of bytes copied.
    pub fn copy_out(
        &self,
        path: impl IntoSlotPath,
        dest: &Path,
        policy: OverwritePolicy,
    ) -> Result<u64> {
        self.ensure_open()?;
        let path = path.into_slot_path()?;
        let physical = self.literal_path(&path)?;

        if dest.exists() && !policy.allows_replace() {
            return Err(BundleError::AlreadyExists(dest.display().to_string()));
        }

        let bytes = std::fs::copy(&physical, dest)?;
        debug!(slot = %path, dest = %dest.display(), bytes, "Copied out of bundle");
        Ok(bytes)
    }

    /// Remove a slot; directories are removed with their whole subtree.
    pub fn delete(&mut self, path: impl IntoSlotPath) -> Result<()> {
        self.ensure_open()?;
        let path = path.into_slot_path()?;
        if path.is_root() {
            return Err(BundleError::invalid_path("/", "the root cannot be deleted"));
        }

        let content = self
            .slots
            .get(&path)
            .cloned()
            .ok_or_else(|| BundleError::NotFound(path.to_string()))?;
        let physical = path.to_physical(self.working_root()?);

        match content {
            SlotContent::Directory => {
                std::fs::remove_dir_all(&physical)?;
                let doomed: Vec<SlotPath> = self
                    .slots
                    .range(path.clone()..)
                    .take_while(|(p, _)| p.starts_with(&path))
                    .map(|(p, _)| p.clone())
                    .collect();
                for p in &doomed {
                    self.slots.remove(p);
                }
                debug!(slot = %path, removed = doomed.len(), "Deleted directory");
            }
            SlotContent::Inline | SlotContent::Binary => {
                std::fs::remove_file(&physical)?;
                self.slots.remove(&path);
                debug!(slot = %path, "Deleted value");
            }
            SlotContent::Reference(_) => {
                self.slots.remove(&path);
                debug!(slot = %path, "Deleted reference");
            }
        }

        Ok(())
    }

    /// Discard the bundle without saving. The working root is removed.
    pub fn close(&mut self) -> Result<()> {
        let workdir = self.workdir.take().ok_or(BundleError::BundleClosed)?;
        self.slots.clear();
        workdir.close()?;
        info!(bundle_id = %self.id, "Bundle closed");
        Ok(())
    }

    /// Insert a slot while reconstructing a bundle from an archive.
    pub(crate) fn insert_restored(&mut self, path: SlotPath, content: SlotContent) -> Result<()> {
        let shadows_marker = match content {
            SlotContent::Reference(_) => path
                .with_suffix(MARKER_SUFFIX)
                .is_some_and(|marker| self.slots.contains_key(&marker)),
            _ => self.marker_conflict(&path),
        };
        if self.kind_of(&path).is_some() || shadows_marker {
            return Err(BundleError::AlreadyExists(path.to_string()));
        }
        self.ensure_parent_dirs(&path)?;
        if content == SlotContent::Directory {
            std::fs::create_dir(path.to_physical(self.working_root()?))?;
        }
        self.slots.insert(path, content);
        Ok(())
    }
}
