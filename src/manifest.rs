//! Build manifest: the cache that makes incremental runs cheap.
//!
//! Decoding and re-encoding images dominates a run. The manifest records, per
//! slug, everything that was produced for an image, so the next run can reuse
//! it without touching a single pixel.
//!
//! # Design
//!
//! The manifest is **content-addressed**: keys are slugs, and a slug already
//! encodes the source content (see [`crate::identity`]). There is no separate
//! staleness check. A changed image gets a new slug and therefore a cache
//! miss, and its old entry simply isn't carried forward.
//!
//! Each run assembles a brand-new manifest from the images discovered in that
//! run. Entries for images that disappeared are dropped, and their files are
//! then removed from the output directory by [`crate::gc`].
//!
//! ## Storage
//!
//! Pretty-printed JSON, keyed by slug:
//!
//! ```json
//! {
//!   "sunset-9f86d081": {
//!     "originalFileName": "sunset-9f86d081-original.jpg",
//!     "width": 1600,
//!     "height": 1200,
//!     "files": [
//!       { "fileName": "sunset-9f86d081-original.jpg", "width": 1600, "height": 1200 },
//!       { "fileName": "sunset-9f86d081-800px.jpg", "width": 800, "height": 600 }
//!     ]
//!   }
//! }
//! ```
//!
//! Keys are kept sorted so an unchanged site produces a byte-identical file.
//! The manifest path comes from config; an empty `manifest_file` disables
//! persistence and every run starts from an empty manifest.

use crate::types::{BuiltImage, Slug};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Manifest {path} is not valid: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Slug → [`BuiltImage`] mapping persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<Slug, BuiltImage>,
}

impl Manifest {
    /// Create an empty manifest (used for `--no-cache` or first build).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the manifest.
    ///
    /// `None` means persistence is disabled: returns an empty manifest without
    /// touching disk. A missing file is a first run and also yields an empty
    /// manifest. A file that exists but does not parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ManifestError> {
        let Some(path) = path else {
            return Ok(Self::empty());
        };
        if !path.exists() {
            log::info!(
                "Can't find manifest {}, starting with an empty one",
                path.display()
            );
            return Ok(Self::empty());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist the manifest. No-op when persistence is disabled.
    ///
    /// Writes to a sibling temp file first and renames it over the target, so
    /// an interrupted write never leaves a truncated manifest behind.
    pub fn save(&self, path: Option<&Path>) -> Result<(), ManifestError> {
        let Some(path) = path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        fs::write(&tmp, json + "\n")?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn get(&self, slug: &str) -> Option<&BuiltImage> {
        self.entries.get(slug)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.entries.contains_key(slug)
    }

    pub fn insert(&mut self, slug: Slug, built: BuiltImage) {
        self.entries.insert(slug, built);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn slugs(&self) -> impl Iterator<Item = &Slug> {
        self.entries.keys()
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&Slug, &mut BuiltImage) -> bool) {
        self.entries.retain(|slug, built| keep(slug, built));
    }

    /// Absolute path of every file the manifest references.
    pub fn files_in(&self, image_dir: &Path) -> Vec<PathBuf> {
        self.entries
            .values()
            .flat_map(|built| built.files.iter())
            .map(|file| image_dir.join(&file.file_name))
            .collect()
    }
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    /// Files dropped by the culling pass.
    pub culled: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} built ({} total)",
                self.hits,
                self.misses,
                self.total()
            )?;
        } else {
            write!(f, "{} built", self.misses)?;
        }
        if self.culled > 0 {
            write!(f, ", {} culled", self.culled)?;
        }
        Ok(())
    }
}
