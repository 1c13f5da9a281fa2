//! The full build, stage by stage.
//!
//! ```text
//! discover ─→ load manifest ─→ reconcile ─→ optimize ─→ cull ─→ rewrite ─→ gc ─→ save manifest
//! ```
//!
//! Every stage runs to completion before the next starts, and any error ends
//! the run. The manifest is written last, so a failed run leaves the previous
//! one in place and the next run still has a valid cache.

use crate::config::{SiteConfig, SitePaths};
use crate::discover::{DiscoverError, discover};
use crate::gc;
use crate::identity::{relative_key, slug};
use crate::imaging::{BuildSettings, ImageBackend};
use crate::manifest::{CacheStats, Manifest, ManifestError};
use crate::process::{
    ProcessError, ProcessEvent, ReconcileRequest, Reconciled, cull_manifest, optimize, reconcile,
};
use crate::rewrite::{RewriteContext, RewriteError, RewriteOutcome, RewriteStats, rewrite_site};
use crate::types::Slug;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Discovery failed: {0}")]
    Discover(#[from] DiscoverError),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Processing failed: {0}")]
    Process(#[from] ProcessError),
    #[error("Rewriting failed: {0}")]
    Rewrite(#[from] RewriteError),
    #[error("Garbage collection failed: {0}")]
    Gc(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// `false` ignores the stored manifest and overwrites existing outputs.
    pub use_cache: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub discovered: usize,
    pub stats: CacheStats,
    pub rewrite: RewriteStats,
    pub removed: Vec<PathBuf>,
    pub manifest_entries: usize,
}

/// Run the whole build.
pub fn run(
    backend: &impl ImageBackend,
    config: &SiteConfig,
    paths: &SitePaths,
    options: BuildOptions,
    progress: Option<&Sender<ProcessEvent>>,
) -> Result<BuildReport, PipelineError> {
    let discovered = discover(&paths.input, &config.exclude)?;

    let old = if options.use_cache {
        Manifest::load(paths.manifest.as_deref())?
    } else {
        log::info!("Cache disabled, rebuilding every image");
        Manifest::empty()
    };

    let settings = BuildSettings::from_config(&config.images, !options.use_cache);
    let request = ReconcileRequest {
        input_root: &paths.input,
        image_dir: &paths.images,
        settings: &settings,
    };
    let Reconciled {
        mut manifest,
        path_to_slug,
        new_files,
        mut stats,
    } = reconcile(backend, &request, &discovered, &old, progress)?;

    optimize(&config.optimizer.command, &new_files, progress)?;

    if config.optimizer.cull {
        stats.culled = cull_manifest(&mut manifest, &paths.images, progress);
    }

    let context = RewriteContext::new(
        &manifest,
        &path_to_slug,
        &config.image_folder,
        &config.images.sizes_attr,
    );
    let RewriteOutcome {
        mut whitelist,
        stats: rewrite,
    } = rewrite_site(&paths.input, &paths.output, &context)?;

    for file in manifest.files_in(&paths.images) {
        whitelist.insert(&file);
    }
    if let Some(manifest_path) = &paths.manifest {
        whitelist.insert(manifest_path);
    }

    let removed = gc::collect(&paths.output, &whitelist)?;

    manifest.save(paths.manifest.as_deref())?;

    Ok(BuildReport {
        discovered: discovered.len(),
        stats,
        rewrite,
        removed,
        manifest_entries: manifest.len(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Cached,
    WouldBuild,
}

/// One discovered image and what a build would do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckEntry {
    pub source_path: String,
    pub slug: Slug,
    pub status: CheckStatus,
}

/// Dry run: discover images and compare against the stored manifest.
///
/// Uses the same hit rule as a build. Writes nothing.
pub fn check(config: &SiteConfig, paths: &SitePaths) -> Result<Vec<CheckEntry>, PipelineError> {
    let discovered = discover(&paths.input, &config.exclude)?;
    let manifest = Manifest::load(paths.manifest.as_deref())?;

    Ok(discovered
        .iter()
        .map(|image| {
            let slug = slug(&image.path, &image.digest);
            let status = match manifest.get(&slug) {
                Some(built) if paths.images.join(&built.original_file_name).exists() => {
                    CheckStatus::Cached
                }
                _ => CheckStatus::WouldBuild,
            };
            CheckEntry {
                source_path: relative_key(&paths.input, &image.path)
                    .unwrap_or_else(|| image.path.display().to_string()),
                slug,
                status,
            }
        })
        .collect())
}
