//! Site configuration module.
//!
//! Handles loading and validating `enfasten.toml`. The file lives in the base
//! directory (the `--basepath` flag, `.` by default) next to the static site
//! generator's own config. Every option is optional; stock defaults apply to
//! whatever is left out.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! input_folder = "_site"                     # Built site to read
//! output_folder = "_fastsite"                # Where the fast site is written
//! image_folder = "assets/images"             # Generated images, inside output_folder
//! manifest_file = "enfasten_manifest.json"   # Build cache ("" disables it)
//! exclude = []                               # Globs relative to input_folder
//!
//! [images]
//! widths = []               # Widths to downsample to
//! quality = 90              # JPEG encode quality (1-100)
//! scale_threshold = 0.9     # Skip variants that keep more than this share of the width
//! sizes_attr = ""           # Value for the `sizes` attribute ("" = omit)
//!
//! [optimizer]
//! command = []              # Run on every new file, e.g. ["image_optim"]
//! cull = true               # Drop variants that stopped paying for themselves
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! Once loaded, the config is an immutable value. [`SitePaths`] resolves the
//! relative folders against the base directory a single time, and every stage
//! receives both by reference.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the base directory.
pub const CONFIG_FILENAME: &str = "enfasten.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `enfasten.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Directory holding the already-built static site.
    pub input_folder: String,
    /// Directory the rewritten site is mirrored into.
    pub output_folder: String,
    /// Generated image directory, relative to `output_folder`. Also the URL
    /// prefix used in rewritten `<img>` tags.
    pub image_folder: String,
    /// Manifest path relative to the base directory. Empty disables caching.
    pub manifest_file: String,
    /// Glob patterns (relative to `input_folder`) of images to leave alone.
    pub exclude: Vec<String>,
    /// Responsive variant generation.
    pub images: ImagesConfig,
    /// External optimizer and culling.
    pub optimizer: OptimizerConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            input_folder: "_site".to_string(),
            output_folder: "_fastsite".to_string(),
            image_folder: "assets/images".to_string(),
            manifest_file: "enfasten_manifest.json".to_string(),
            exclude: Vec::new(),
            images: ImagesConfig::default(),
            optimizer: OptimizerConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        let t = self.images.scale_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ConfigError::Validation(
                "images.scale_threshold must be in (0, 1]".into(),
            ));
        }
        if self.images.widths.contains(&0) {
            return Err(ConfigError::Validation(
                "images.widths values must be non-zero".into(),
            ));
        }
        if self.input_folder.is_empty() || self.output_folder.is_empty() {
            return Err(ConfigError::Validation(
                "input_folder and output_folder must not be empty".into(),
            ));
        }
        let image_folder = Path::new(&self.image_folder);
        if image_folder.is_absolute()
            || image_folder
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ConfigError::Validation(
                "image_folder must stay inside output_folder".into(),
            ));
        }
        Ok(())
    }
}

/// Responsive variant generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Pixel widths to downsample to. Widths at or above an image's native
    /// width are never produced.
    pub widths: Vec<u32>,
    /// JPEG encode quality (1 = worst, 100 = best). PNG is lossless.
    pub quality: u32,
    /// A variant is only generated when `width / native_width` is at most this.
    pub scale_threshold: f64,
    /// Emitted as the `sizes` attribute alongside `srcset` when non-empty.
    pub sizes_attr: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            widths: Vec::new(),
            quality: 90,
            scale_threshold: 0.9,
            sizes_attr: String::new(),
        }
    }
}

/// External optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    /// Executable plus fixed arguments. Newly created files are appended.
    /// Empty means no optimizer.
    pub command: Vec<String>,
    /// Drop files that are not byte-smaller than every wider file.
    pub cull: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            cull: true,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Absolute locations derived from the base directory and a [`SiteConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Where generated images land (`output/image_folder`).
    pub images: PathBuf,
    /// `None` when `manifest_file` is empty.
    pub manifest: Option<PathBuf>,
}

impl SitePaths {
    /// Resolve the configured folders against `base`.
    ///
    /// Everything under the output folder that a build didn't write gets
    /// deleted, so the folders are checked here, after `.` and `..` are
    /// collapsed: the output folder may not be the base directory or one of
    /// its ancestors, and input and output may not contain one another.
    pub fn resolve(base: &Path, config: &SiteConfig) -> Result<Self, ConfigError> {
        let base = clean_path(&std::path::absolute(base)?);
        let input = clean_path(&base.join(&config.input_folder));
        let output = clean_path(&base.join(&config.output_folder));

        if base.starts_with(&output) {
            return Err(ConfigError::Validation(format!(
                "output_folder {} would contain the base directory {}",
                output.display(),
                base.display()
            )));
        }
        if input.starts_with(&output) || output.starts_with(&input) {
            return Err(ConfigError::Validation(
                "input_folder and output_folder must not contain one another".into(),
            ));
        }

        Ok(Self {
            images: clean_path(&output.join(&config.image_folder)),
            manifest: (!config.manifest_file.is_empty())
                .then(|| clean_path(&base.join(&config.manifest_file))),
            input,
            output,
        })
    }
}

/// Collapse `.` and `..` without touching the filesystem.
///
/// `..` at the root stays at the root; leading `..` of a relative path is kept.
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if cleaned.file_name().is_some() {
                    cleaned.pop();
                } else if !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Load `enfasten.toml` from the base directory.
///
/// Returns stock defaults when the file does not exist. The loaded config is
/// validated before it is returned.
pub fn load_config(base: &Path) -> Result<SiteConfig, ConfigError> {
    let path = base.join(CONFIG_FILENAME);
    if !path.exists() {
        log::info!("No {} in {}, using defaults", CONFIG_FILENAME, base.display());
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    let config: SiteConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// A documented stock `enfasten.toml` with every option at its default.
pub fn stock_config_toml() -> &'static str {
    r#"# enfasten configuration
# All options are optional. Values shown are the defaults.

# Directory holding the already-built static site.
input_folder = "_site"

# Directory the fast site is written to. Anything in here that the run
# did not produce is deleted.
output_folder = "_fastsite"

# Where generated images go, relative to output_folder. Also the URL
# prefix used in rewritten <img> tags.
image_folder = "assets/images"

# Build cache, relative to this file. Set to "" to rebuild every run.
manifest_file = "enfasten_manifest.json"

# Images to leave untouched, as globs relative to input_folder.
# exclude = ["favicons/**", "*.thumb.jpg"]
exclude = []

[images]
# Widths to downsample to, e.g. [480, 800, 1200].
widths = []

# JPEG encode quality (1-100). PNG output is lossless.
quality = 90

# Only generate a variant when it keeps at most this share of the
# original width.
scale_threshold = 0.9

# Value for the sizes attribute next to srcset. Empty omits it.
sizes_attr = ""

[optimizer]
# Command run on every newly created image, files appended as arguments.
# command = ["image_optim"]
command = []

# After optimizing, drop variants that are not smaller on disk than
# every wider variant.
cull = true

[processing]
# Maximum parallel workers. Omit to use all cores.
# max_processes = 4
"#
}
