//! Archive worker for the progress stream.
//!
//! Walks the root directory and writes every regular file into a deflated
//! zip at the archive target, reporting each file to the controller as it goes.

use crate::streaming::channel::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
use crate::streaming::target::ArchiveTarget;
use anyhow::{anyhow, Context, Result};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Files at or above this size need zip64 headers.
const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

/// A regular file found during the walk.
#[derive(Debug, Clone)]
struct WalkEntry {
    /// Path on disk
    path: PathBuf,
    /// `/`-separated path relative to the root, used as the zip entry name
    relative: String,
}

/// Worker state
pub struct ArchiveWorker {
    target: ArchiveTarget,
}

impl ArchiveWorker {
    pub fn new(target: ArchiveTarget) -> Self {
        Self { target }
    }

    /// Start the worker on the blocking pool.
    ///
    /// Dropping the returned receiver cancels the run at the next file.
    pub fn spawn(self) -> (JoinHandle<()>, ProgressReceiver) {
        let (tx, rx) = progress_channel();
        let handle = tokio::task::spawn_blocking(move || self.run(tx));
        (handle, rx)
    }

    /// Run the worker to completion on the current thread.
    ///
    /// Sends exactly one `Done` or `Error` at the end, unless the receiver
    /// went away first.
    pub fn run(self, tx: ProgressSender) {
        info!(
            root = %self.target.root().display(),
            archive = %self.target.archive_path().display(),
            "Starting archive"
        );

        match self.build_archive(&tx) {
            Ok(files) => {
                info!(files, "Archive complete");
                let _ = tx.send(ProgressEvent::Done);
            }
            Err(_) if tx.is_closed() => {
                debug!("Progress receiver dropped, abandoning archive");
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Archive failed");
                let _ = tx.send(ProgressEvent::failure(&e));
            }
        }
    }

    /// Returns the number of files written.
    fn build_archive(&self, tx: &ProgressSender) -> Result<u64> {
        let archive_path = self.target.archive_path();
        let file = File::create(archive_path)
            .with_context(|| format!("Failed to create {}", archive_path.display()))?;
        // Resolved after creation so the walk can recognise the archive itself.
        let archive_id = fs::canonicalize(archive_path)
            .with_context(|| format!("Failed to resolve {}", archive_path.display()))?;

        let mut zip = ZipWriter::new(BufWriter::new(file));

        let walker = WalkBuilder::new(self.target.root())
            .standard_filters(false)
            .follow_links(false)
            .build();

        let mut files = 0u64;
        let mut names = HashSet::new();
        for entry in walker {
            let entry = entry.context("Failed to walk directory")?;
            let Some(entry) = self.walk_entry(entry, &archive_id)? else {
                continue;
            };
            // Non-UTF-8 names are stored lossily and may collide.
            if !names.insert(entry.relative.clone()) {
                warn!(
                    path = %entry.path.display(),
                    name = %entry.relative,
                    "Skipping file whose archive name is already taken"
                );
                continue;
            }

            tx.send(ProgressEvent::output(entry.relative.clone()))
                .map_err(|_| anyhow!("Progress channel closed"))?;
            debug!(path = %entry.relative, "Adding file");

            let mut src = File::open(&entry.path)
                .with_context(|| format!("Failed to open {}", entry.path.display()))?;
            let size = src
                .metadata()
                .with_context(|| format!("Failed to stat {}", entry.path.display()))?
                .len();
            zip.start_file(entry.relative.as_str(), file_options(size))
                .with_context(|| format!("Failed to add {} to archive", entry.relative))?;
            io::copy(&mut src, &mut zip)
                .with_context(|| format!("Failed to compress {}", entry.path.display()))?;

            files += 1;
        }

        let mut out = zip
            .finish()
            .with_context(|| format!("Failed to finalize {}", archive_path.display()))?;
        out.flush()
            .with_context(|| format!("Failed to flush {}", archive_path.display()))?;
        out.get_ref()
            .sync_all()
            .with_context(|| format!("Failed to sync {}", archive_path.display()))?;

        Ok(files)
    }

    /// Classify one walk entry. `None` for anything that is not archived.
    fn walk_entry(&self, entry: ignore::DirEntry, archive_id: &Path) -> Result<Option<WalkEntry>> {
        let Some(file_type) = entry.file_type() else {
            return Ok(None);
        };
        let path = entry.into_path();

        if file_type.is_symlink() {
            // Symlinked files are archived with their target's content.
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => return Ok(None),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping dangling symlink");
                    return Ok(None);
                }
            }
        } else if !file_type.is_file() {
            return Ok(None);
        }

        if is_same_file(&path, file_type.is_symlink(), archive_id) {
            debug!(path = %path.display(), "Skipping archive target");
            return Ok(None);
        }

        let relative = relative_name(self.target.root(), &path)
            .with_context(|| format!("{} is outside the archive root", path.display()))?;

        Ok(Some(WalkEntry { path, relative }))
    }
}

fn file_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= LARGE_FILE_THRESHOLD)
}

/// A symlink can point at the archive under any name, so only plain files
/// take the file-name shortcut.
fn is_same_file(path: &Path, is_symlink: bool, archive_id: &Path) -> bool {
    if !is_symlink && path.file_name() != archive_id.file_name() {
        return false;
    }
    fs::canonicalize(path).is_ok_and(|p| p == archive_id)
}

/// Zip entry name for `path`: relative to `root`, `/`-separated.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
