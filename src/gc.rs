//! Output garbage collection.
//!
//! Every run records each path it writes (mirrored site files, HTML, manifest
//! images) in a [`Whitelist`]. Anything else under the output root is left
//! over from an earlier run and gets deleted, so renamed pages and replaced
//! images don't accumulate.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Output paths to keep, closed under "parent directory".
///
/// Inserting a path also inserts every ancestor up to (not including) the
/// root. The walk stops at the first ancestor already present, since its own
/// ancestors were added with it.
#[derive(Debug, Clone)]
pub struct Whitelist {
    root: PathBuf,
    paths: HashSet<PathBuf>,
}

impl Whitelist {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            paths: HashSet::new(),
        }
    }

    /// Whitelist `path` and its ancestors. Paths outside the root are ignored.
    pub fn insert(&mut self, path: &Path) {
        let mut current = Some(path);
        while let Some(p) = current {
            if p == self.root || !p.starts_with(&self.root) {
                break;
            }
            if !self.paths.insert(p.to_path_buf()) {
                break;
            }
            current = p.parent();
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path == self.root || self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Delete everything under `output_root` that is not whitelisted.
///
/// A directory that isn't whitelisted is removed with its whole subtree, so
/// its contents are never visited. Deletion starts only after the walk
/// finishes; the first failure aborts and is returned. Returns the removed
/// paths in walk order.
pub fn collect(output_root: &Path, whitelist: &Whitelist) -> io::Result<Vec<PathBuf>> {
    if !output_root.exists() {
        return Ok(Vec::new());
    }

    let mut doomed = Vec::new();
    let mut walker = WalkDir::new(output_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        if whitelist.contains(entry.path()) {
            continue;
        }
        let is_dir = entry.file_type().is_dir();
        if is_dir {
            walker.skip_current_dir();
        }
        doomed.push((entry.into_path(), is_dir));
    }

    let mut removed = Vec::with_capacity(doomed.len());
    for (path, is_dir) in doomed {
        log::info!("Removing stale {}", path.display());
        if is_dir {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed.push(path);
    }
    Ok(removed)
}
