//! Source tree walker.
//!
//! Walks a workspace depth-first, pruning ignored directories and skipping
//! ignored files, and reports every remaining entry relative to the root.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use walkdir::WalkDir;

use super::filter::FileClassifier;
use crate::error::WatcherError;
use crate::Result;

/// Walk statistics.
#[derive(Debug, Default)]
pub struct WalkStats {
    /// Entries read from the file system, pruned ones included.
    pub entries_seen: AtomicU64,
    /// Entries handed to the visitor.
    pub entries_yielded: AtomicU64,
    /// Directories skipped together with their contents.
    pub dirs_pruned: AtomicU64,
    /// Ignored or unsupported files.
    pub files_skipped: AtomicU64,
}

impl WalkStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WalkStatsSnapshot {
        WalkStatsSnapshot {
            entries_seen: self.entries_seen.load(Ordering::Relaxed),
            entries_yielded: self.entries_yielded.load(Ordering::Relaxed),
            dirs_pruned: self.dirs_pruned.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of walk stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkStatsSnapshot {
    /// Entries read from the file system.
    pub entries_seen: u64,
    /// Entries handed to the visitor.
    pub entries_yielded: u64,
    /// Directories skipped together with their contents.
    pub dirs_pruned: u64,
    /// Ignored or unsupported files.
    pub files_skipped: u64,
}

/// An entry that survived filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Path relative to the walk root, or absolute if it cannot be made
    /// relative.
    pub path: PathBuf,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Walk `root`, calling `callback` for every relevant entry below it.
///
/// Ignored directories are not descended into. The first filesystem error
/// or callback error aborts the walk and is returned.
///
/// # Errors
///
/// Returns [`WatcherError::Walk`] on traversal failure, or the callback's
/// error.
pub fn walk_source_tree<F>(
    root: &Path,
    classifier: &FileClassifier,
    mut callback: F,
) -> Result<WalkStatsSnapshot>
where
    F: FnMut(&SourceEntry) -> Result<()>,
{
    let stats = WalkStats::new();

    tracing::debug!(path = %root.display(), "Starting source tree walk");

    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            stats.entries_seen.fetch_add(1, Ordering::Relaxed);
            let is_dir = entry.file_type().is_dir();
            if classifier.should_ignore_entry(entry.path(), is_dir) {
                let counter = if is_dir {
                    &stats.dirs_pruned
                } else {
                    &stats.files_skipped
                };
                counter.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            true
        });

    for entry in walker {
        let entry = entry.map_err(|e| WatcherError::Walk {
            path: e
                .path()
                .unwrap_or(root)
                .display()
                .to_string(),
            reason: e.to_string(),
        })?;

        let path = entry
            .path()
            .strip_prefix(root)
            .map_or_else(|_| entry.path().to_path_buf(), Path::to_path_buf);

        callback(&SourceEntry {
            path,
            is_dir: entry.file_type().is_dir(),
        })?;
        stats.entries_yielded.fetch_add(1, Ordering::Relaxed);
    }

    let snapshot = stats.snapshot();
    tracing::info!(
        path = %root.display(),
        seen = snapshot.entries_seen,
        yielded = snapshot.entries_yielded,
        pruned = snapshot.dirs_pruned,
        skipped = snapshot.files_skipped,
        "Source tree walk complete"
    );

    Ok(snapshot)
}

/// Absolute directories under `root` holding at least one relevant file.
///
/// # Errors
///
/// Returns an error if the walk fails.
pub fn relevant_dirs(root: &Path, classifier: &FileClassifier) -> Result<BTreeSet<PathBuf>> {
    let mut dirs = BTreeSet::new();
    walk_source_tree(root, classifier, |entry| {
        if !entry.is_dir {
            let absolute = root.join(&entry.path);
            if let Some(parent) = absolute.parent() {
                dirs.insert(parent.to_path_buf());
            }
        }
        Ok(())
    })?;
    Ok(dirs)
}
