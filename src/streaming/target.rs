//! Archive target: where the walk starts and where the zip is written.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Default archive file name, written inside the walked root.
pub const DEFAULT_ARCHIVE_NAME: &str = "notebook.zip";

/// Root of the walk plus the output path of the archive.
///
/// Only one archive run should be active against a given target at a time;
/// concurrent runs race on the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    root: PathBuf,
    archive: PathBuf,
}

impl ArchiveTarget {
    /// Target for `name` inside `root`.
    pub fn new(root: impl Into<PathBuf>, name: &str) -> Self {
        let root = root.into();
        let archive = root.join(name);
        Self { root, archive }
    }

    /// Target writing to an arbitrary path, possibly outside `root`.
    pub fn with_archive_path(root: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archive: archive.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    /// File name used in status lines, e.g. `notebook.zip`.
    pub fn display_name(&self) -> Cow<'_, str> {
        self.archive
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.archive.to_string_lossy())
    }
}

impl Default for ArchiveTarget {
    fn default() -> Self {
        Self::new(".", DEFAULT_ARCHIVE_NAME)
    }
}
