//! Image discovery.
//!
//! First stage of the pipeline. Walks the built site, picks out the images
//! the pipeline owns and computes their content digests:
//!
//! ```text
//! _site/
//! ├── index.html
//! ├── assets/
//! │   ├── logo.png            ✓ discovered
//! │   └── favicon.ico         ✗ not an image we resize
//! └── blog/
//!     ├── post.html
//!     └── photos/
//!         ├── beach.jpg       ✓ discovered
//!         └── beach.thumb.jpg ✗ excluded by "**/*.thumb.jpg"
//! ```
//!
//! Exclusion patterns are globs matched against the path relative to the
//! input root. `*` stays within one directory, `**` crosses directories.
//! An invalid pattern is a configuration error and aborts the run.
//!
//! Hashing is the only expensive part, so it runs on the rayon pool. The walk
//! itself is sorted by file name, making the result order stable; nothing
//! downstream relies on that beyond readable logs.

use crate::identity::{digest_file, relative_key};
use crate::types::FoundImage;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Extensions the pipeline resizes. Matched ASCII case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg"];

/// Compile exclusion globs into a single matcher.
pub fn build_excludes(patterns: &[String]) -> Result<GlobSet, DiscoverError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| DiscoverError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|source| DiscoverError::InvalidPattern {
            pattern: patterns.join(", "),
            source,
        })
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| ext.eq_ignore_ascii_case(i)))
}

/// Walk `input_root` and return every image not matched by `exclude`.
pub fn discover(input_root: &Path, exclude: &[String]) -> Result<Vec<FoundImage>, DiscoverError> {
    let excludes = build_excludes(exclude)?;

    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(input_root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let rel = relative_key(input_root, entry.path()).unwrap_or_default();
        if excludes.is_match(&rel) {
            log::debug!("Excluded {}", rel);
            continue;
        }
        candidates.push(entry.into_path());
    }

    let found = candidates
        .into_par_iter()
        .map(|path| {
            let digest = digest_file(&path)?;
            Ok(FoundImage { path, digest })
        })
        .collect::<Result<Vec<_>, DiscoverError>>()?;

    log::info!("Discovered {} images in {}", found.len(), input_root.display());
    Ok(found)
}
