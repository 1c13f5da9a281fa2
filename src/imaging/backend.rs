//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two pixel-touching operations the
//! pipeline needs: identify and resize. Everything else (deciding which
//! variants to produce, naming, copying originals, skipping existing files)
//! lives in [`operations`](super::operations) and is backend-agnostic.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend) on the `image` crate.

use super::params::ResizeParams;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Unsupported pixel layout {layout} for {path}")]
    UnsupportedPixelLayout { layout: String, path: String },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Sync` because builds for different images run in parallel on rayon.
pub trait ImageBackend: Sync {
    /// Decode enough of the image to know its native dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode `params.source` once, then downsample and encode it to every
    /// target. Each output must appear complete or not at all.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;
}

/// Scratch name an output is written under before it is renamed into place.
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}
