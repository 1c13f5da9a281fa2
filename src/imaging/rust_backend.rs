//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header only) |
//! | Decode (JPEG, PNG) | `image::ImageReader` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3`, every target from one decode |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at the configured quality |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless) |
//!
//! `resize_exact` allocates the output in the same pixel layout as the
//! decoded source (gray stays gray, RGBA stays RGBA), so the only conversion
//! is the one the target codec would force. Layouts the codec can't store are
//! rejected rather than silently converted.
//!
//! Outputs are encoded in memory and renamed into place, so a failed run never
//! leaves a truncated file that a later run would mistake for a finished one.

use super::backend::{BackendError, Dimensions, ImageBackend, partial_path};
use super::params::{Codec, ResizeParams};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::path::Path;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Reject pixel layouts the target codec cannot store.
fn check_layout(img: &DynamicImage, codec: Codec, path: &Path) -> Result<(), BackendError> {
    let supported = match codec {
        Codec::Jpeg => matches!(
            img,
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_)
        ),
        Codec::Png => !matches!(
            img,
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)
        ),
    };
    if supported {
        Ok(())
    } else {
        Err(BackendError::UnsupportedPixelLayout {
            layout: format!("{:?}", img.color()),
            path: path.display().to_string(),
        })
    }
}

fn encode(img: &DynamicImage, codec: Codec, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let result = match codec {
        Codec::Jpeg => img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality as u8)),
        Codec::Png => img.write_with_encoder(PngEncoder::new(&mut buf)),
    };
    result.map_err(|e| BackendError::ProcessingFailed(format!("{codec:?} encode failed: {e}")))?;
    Ok(buf)
}

/// Write `bytes` next to `path` and rename into place.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    let tmp = partial_path(path);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Failed to read dimensions of {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Dimensions { width, height })
    }

    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        check_layout(&img, params.codec, &params.source)?;
        for target in &params.targets {
            let resized = img.resize_exact(target.width, target.height, FilterType::Lanczos3);
            let bytes = encode(&resized, params.codec, params.quality.value())?;
            write_atomically(&target.output, &bytes)?;
        }
        Ok(())
    }
}
