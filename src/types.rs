//! Shared types used across pipeline stages.
//!
//! [`BuiltImage`] and [`BuiltImageFile`] are persisted in the manifest, so
//! their serialized field names are part of the on-disk format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Manifest key: `<file stem>-<8 hex chars of the content digest>`.
pub type Slug = String;

/// Input-relative path (`/`-separated) → slug. Rebuilt every run.
pub type PathToSlug = BTreeMap<String, Slug>;

/// An image found by discovery. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundImage {
    pub path: PathBuf,
    /// SHA-256 of the file contents.
    pub digest: Vec<u8>,
}

/// One file in the image output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltImageFile {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Everything produced for one source image.
///
/// `files` always starts with the untouched original and is sorted by
/// strictly decreasing width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltImage {
    pub original_file_name: String,
    pub width: u32,
    pub height: u32,
    pub files: Vec<BuiltImageFile>,
}

impl BuiltImage {
    /// Restore the descending-width order of `files`.
    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| b.width.cmp(&a.width));
    }
}
