//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take configuration, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend, partial_path};
use super::calculations::{PlannedVariant, plan_variants};
use super::params::{Codec, Quality, ResizeParams, ResizeTarget};
use crate::types::{BuiltImage, BuiltImageFile};
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Settings shared by every image build in a run.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub widths: Vec<u32>,
    pub scale_threshold: f64,
    pub quality: Quality,
    /// Re-write outputs even if they already exist (`--no-cache`).
    pub overwrite: bool,
}

impl BuildSettings {
    pub fn from_config(config: &crate::config::ImagesConfig, overwrite: bool) -> Self {
        Self {
            widths: config.widths.clone(),
            scale_threshold: config.scale_threshold,
            quality: Quality::new(config.quality),
            overwrite,
        }
    }
}

/// What a single image build produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub built: BuiltImage,
    /// Files written during this build, in the order they were written.
    /// Files that already existed are recorded in `built` but not here.
    pub created: Vec<PathBuf>,
}

/// Output file name for the untouched original.
pub fn original_file_name(slug: &str, ext: &str) -> String {
    format!("{slug}-original{ext}")
}

/// Output file name for a downsized variant.
pub fn variant_file_name(slug: &str, width: u32, ext: &str) -> String {
    format!("{slug}-{width}px{ext}")
}

/// Extension of `path` including the dot, as written in the source.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Copy `source` under a scratch name and rename it to `dest`.
fn copy_atomically(source: &Path, dest: &Path) -> std::io::Result<()> {
    let tmp = partial_path(dest);
    std::fs::copy(source, &tmp)?;
    std::fs::rename(&tmp, dest)
}

/// Build every output for one source image into `image_dir`.
///
/// Copies the original, then downsamples to each width that
/// [`plan_variants`] keeps, decoding the source once for all of them. Existing outputs are left alone unless
/// `settings.overwrite` is set, which makes re-runs after an interrupted
/// build cheap. The returned file list is sorted by decreasing width, so the
/// original always comes first.
pub fn build_image(
    backend: &impl ImageBackend,
    source: &Path,
    slug: &str,
    image_dir: &Path,
    settings: &BuildSettings,
) -> Result<BuildOutcome> {
    let codec = Codec::from_path(source)
        .ok_or_else(|| BackendError::UnsupportedFormat(source.display().to_string()))?;
    let ext = dotted_extension(source);

    let dims = backend.identify(source)?;
    log::info!(
        "Building image {} from {} ({}x{})",
        slug,
        source.display(),
        dims.width,
        dims.height
    );

    let mut created = Vec::new();

    let original_name = original_file_name(slug, &ext);
    let original_path = image_dir.join(&original_name);
    if settings.overwrite || !original_path.exists() {
        copy_atomically(source, &original_path)?;
        created.push(original_path);
    } else {
        log::debug!("Original already copied, skipping: {}", original_path.display());
    }

    let mut built = BuiltImage {
        original_file_name: original_name.clone(),
        width: dims.width,
        height: dims.height,
        files: vec![BuiltImageFile {
            file_name: original_name,
            width: dims.width,
            height: dims.height,
        }],
    };

    let planned = plan_variants(
        (dims.width, dims.height),
        &settings.widths,
        settings.scale_threshold,
        codec.is_lossy(),
    );

    let mut targets = Vec::new();
    for PlannedVariant { width, height } in planned {
        let name = variant_file_name(slug, width, &ext);
        let output = image_dir.join(&name);
        built.files.push(BuiltImageFile {
            file_name: name,
            width,
            height,
        });

        if !settings.overwrite && output.exists() {
            log::debug!("Image already exists, skipping: {}", output.display());
            continue;
        }

        log::debug!(
            "Downscaling {} from {}x{} to {}x{}",
            slug,
            dims.width,
            dims.height,
            width,
            height
        );
        targets.push(ResizeTarget {
            output,
            width,
            height,
        });
    }

    if !targets.is_empty() {
        let params = ResizeParams {
            source: source.to_path_buf(),
            codec,
            quality: settings.quality,
            targets,
        };
        backend.resize(&params)?;
        created.extend(params.targets.into_iter().map(|t| t.output));
    }

    built.sort_files();
    Ok(BuildOutcome { built, created })
}
