//! Worksheet image resolution
//!
//! Maps a work item to the one path its photo can live at. The corpus has
//! exactly one naming scheme and the resolver never falls back to another:
//! a missing file is "no asset", which the driver treats the same as "no
//! extraction yet".

use std::path::{Path, PathBuf};

use crate::models::{Catalog, WorkItem};

/// Resolves work items to worksheet photo paths under the root folder
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
    catalog: Catalog,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>, catalog: Catalog) -> Self {
        Self {
            root: root.into(),
            catalog,
        }
    }

    /// File suffix for an exercise index.
    ///
    /// Scans in each folder start at `_00`/`_01` (cover and instruction
    /// sheets), so exercise 1 is file `_02`: suffix = index + 1, zero-padded
    /// to two digits.
    fn file_suffix(index: u32) -> String {
        format!("{:02}", index + 1)
    }

    /// The only path this item's photo can have, whether or not it exists
    pub fn candidate_path(&self, item: &WorkItem) -> Option<PathBuf> {
        let spec = self.catalog.group(item.group)?;
        let file_name = format!("{}_{}.jpg", spec.folder_name, Self::file_suffix(item.index));
        Some(self.root.join(&spec.folder_name).join(file_name))
    }

    /// Resolve an item to its on-disk photo, or `None` if the photo is
    /// missing (not yet uploaded). Never fatal.
    pub fn resolve(&self, item: &WorkItem) -> Option<PathBuf> {
        let path = self.candidate_path(item)?;
        if path.is_file() {
            Some(path)
        } else {
            tracing::debug!(item = %item, path = %path.display(), "No asset for item");
            None
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
