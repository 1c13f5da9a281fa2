//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what images to create) and the [`backend`](super::backend)
//! (which does the actual pixel work). This separation allows swapping backends
//! (e.g. for testing with a mock) without changing operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Codec`]: The source image's codec, which is also the output codec.
//! - [`ResizeParams`]: one source and every [`ResizeTarget`] built from it.

use std::path::{Path, PathBuf};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Codecs the pipeline reads and writes. Variants are always encoded with the
/// same codec as their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Png,
    Jpeg,
}

impl Codec {
    /// Pick the codec from a file extension (ASCII case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Whether re-encoding loses information.
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

/// One output of a resize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeTarget {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Downsample one source to every target. The source is decoded once.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub codec: Codec,
    /// Ignored for lossless codecs.
    pub quality: Quality,
    pub targets: Vec<ResizeTarget>,
}
