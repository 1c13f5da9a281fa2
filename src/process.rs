//! Build orchestration: cache reconciliation, optimization and culling.
//!
//! Takes the images found by [`crate::discover`] and the manifest from the
//! previous run and produces this run's manifest:
//!
//! ```text
//! discovered ──┬─ slug in old manifest, original on disk ──→ reuse entry (no decode)
//!              └─ otherwise ──────────────────────────────→ build_image (decode + resize)
//!                                                                │
//!                               new files ──→ optimizer ──→ cull ┘
//! ```
//!
//! ## Cache hits
//!
//! A hit is keyed purely by slug. Since the slug includes a content digest,
//! any edit to an image is a miss, so there is no partial staleness to track.
//! The one extra check is that the entry's original file still exists in the
//! image directory; if someone deleted the output directory, the image is
//! rebuilt instead of pointing HTML at a missing file.
//!
//! ## Parallel Processing
//!
//! Cache misses are built in parallel using [rayon](https://docs.rs/rayon).
//! Manifest assembly happens after all builds finish. The first failing image
//! aborts the run; no partial manifest is returned.
//!
//! ## Culling
//!
//! An external optimizer can make a wider image byte-smaller than a narrower
//! one. Serving the narrower file then costs bytes without saving any, so
//! [`cull`] walks each file list from widest to narrowest and keeps a file
//! only if it is strictly smaller on disk than everything kept before it.
//! Culling runs over the whole assembled manifest, cache hits and fresh
//! builds alike.

use crate::identity::{relative_key, slug};
use crate::imaging::{BackendError, BuildSettings, ImageBackend, build_image};
use crate::manifest::{CacheStats, Manifest};
use crate::types::{BuiltImage, FoundImage, PathToSlug, Slug};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("Could not start optimizer '{program}': {source}")]
    OptimizerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Optimizer '{command}' failed: {status}")]
    OptimizerFailed { command: String, status: ExitStatus },
}

/// Whether a build wrote a file or found it already in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Created,
    Existing,
}

/// One output file of a fresh build, for progress display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file_name: String,
    pub width: u32,
    pub status: FileStatus,
}

/// Why the culling pass dropped a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullReason {
    Missing,
    NotSmaller { size: u64, best: u64 },
}

/// A file removed from a manifest entry by [`cull`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CullDecision {
    pub file_name: String,
    pub reason: CullReason,
}

/// Progress events emitted while processing, for the CLI printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    ImageCached {
        slug: Slug,
        source_path: String,
    },
    ImageBuilt {
        slug: Slug,
        source_path: String,
        files: Vec<FileReport>,
    },
    OptimizerStarted {
        file_count: usize,
    },
    FileCulled {
        slug: Slug,
        decision: CullDecision,
    },
    EntryDropped {
        slug: Slug,
    },
}

fn emit(progress: Option<&Sender<ProcessEvent>>, event: ProcessEvent) {
    if let Some(tx) = progress {
        // The printer going away must not fail the build.
        tx.send(event).ok();
    }
}

/// Locations a reconciliation reads from and writes to.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileRequest<'a> {
    pub input_root: &'a Path,
    pub image_dir: &'a Path,
    pub settings: &'a BuildSettings,
}

/// Result of [`reconcile`].
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub manifest: Manifest,
    pub path_to_slug: PathToSlug,
    /// Every file written during this run, for the optimizer.
    pub new_files: Vec<PathBuf>,
    pub stats: CacheStats,
}

fn built_event(slug: &str, source_path: &str, built: &BuiltImage, created: &[PathBuf]) -> ProcessEvent {
    let files = built
        .files
        .iter()
        .map(|f| FileReport {
            file_name: f.file_name.clone(),
            width: f.width,
            status: if created.iter().any(|c| c.ends_with(&f.file_name)) {
                FileStatus::Created
            } else {
                FileStatus::Existing
            },
        })
        .collect();
    ProcessEvent::ImageBuilt {
        slug: slug.to_string(),
        source_path: source_path.to_string(),
        files,
    }
}

/// Reconcile discovered images against the previous manifest.
///
/// Returns a brand-new manifest covering exactly the discovered images:
/// reused entries for cache hits, fresh builds for misses. Entries of the old
/// manifest that were not discovered are not carried over.
pub fn reconcile(
    backend: &impl ImageBackend,
    request: &ReconcileRequest<'_>,
    discovered: &[FoundImage],
    old: &Manifest,
    progress: Option<&Sender<ProcessEvent>>,
) -> Result<Reconciled, ProcessError> {
    std::fs::create_dir_all(request.image_dir)?;

    let mut path_to_slug = PathToSlug::new();
    // Identical name + content in two places is one slug, built once.
    let mut unique: BTreeMap<Slug, (&FoundImage, String)> = BTreeMap::new();
    for image in discovered {
        let slug = slug(&image.path, &image.digest);
        let rel = relative_key(request.input_root, &image.path)
            .unwrap_or_else(|| image.path.display().to_string());
        path_to_slug.insert(rel.clone(), slug.clone());
        unique.entry(slug).or_insert((image, rel));
    }

    let mut manifest = Manifest::empty();
    let mut stats = CacheStats::default();
    let mut to_build: Vec<(Slug, &FoundImage, String)> = Vec::new();

    for (slug, (image, rel)) in unique {
        match old.get(&slug) {
            Some(built) if request.image_dir.join(&built.original_file_name).exists() => {
                stats.hit();
                emit(
                    progress,
                    ProcessEvent::ImageCached {
                        slug: slug.clone(),
                        source_path: rel,
                    },
                );
                manifest.insert(slug, built.clone());
            }
            Some(_) => {
                log::warn!("Cached original for {} is missing, rebuilding", slug);
                to_build.push((slug, image, rel));
            }
            None => to_build.push((slug, image, rel)),
        }
    }

    let outcomes = to_build
        .par_iter()
        .map(|(slug, image, rel)| {
            let outcome = build_image(
                backend,
                &image.path,
                slug,
                request.image_dir,
                request.settings,
            )?;
            emit(
                progress,
                built_event(slug, rel, &outcome.built, &outcome.created),
            );
            Ok((slug.clone(), outcome))
        })
        .collect::<Result<Vec<_>, ProcessError>>()?;

    let mut new_files = Vec::new();
    for (slug, outcome) in outcomes {
        stats.miss();
        new_files.extend(outcome.created);
        manifest.insert(slug, outcome.built);
    }

    log::info!("New images: {}", new_files.len());

    Ok(Reconciled {
        manifest,
        path_to_slug,
        new_files,
        stats,
    })
}

/// Run the external optimizer over newly created files.
///
/// `command` is the executable followed by fixed arguments; the files are
/// appended. No-op when no command is configured or nothing new was written.
/// A non-zero exit fails the run.
pub fn optimize(
    command: &[String],
    new_files: &[PathBuf],
    progress: Option<&Sender<ProcessEvent>>,
) -> Result<(), ProcessError> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };
    if new_files.is_empty() {
        return Ok(());
    }

    log::info!("Optimizing {} files with {:?}", new_files.len(), command);
    emit(
        progress,
        ProcessEvent::OptimizerStarted {
            file_count: new_files.len(),
        },
    );

    let status = Command::new(program)
        .args(args)
        .args(new_files)
        .status()
        .map_err(|source| ProcessError::OptimizerSpawn {
            program: program.clone(),
            source,
        })?;

    if !status.success() {
        return Err(ProcessError::OptimizerFailed {
            command: command.join(" "),
            status,
        });
    }
    Ok(())
}

/// Drop files that don't shrink on disk as their width shrinks.
///
/// Walks `built.files` in stored (decreasing width) order. A file is kept only
/// when its size is strictly below the smallest size kept so far. Missing
/// files are always dropped.
pub fn cull(image_dir: &Path, built: &BuiltImage) -> (BuiltImage, Vec<CullDecision>) {
    let mut best = u64::MAX;
    let mut kept = Vec::with_capacity(built.files.len());
    let mut dropped = Vec::new();

    for file in &built.files {
        let reason = match std::fs::metadata(image_dir.join(&file.file_name)) {
            Ok(meta) if meta.len() < best => {
                best = meta.len();
                kept.push(file.clone());
                continue;
            }
            Ok(meta) => {
                log::info!(
                    "Culling {}, it is {} bytes when a larger image was only {} bytes",
                    file.file_name,
                    meta.len(),
                    best
                );
                CullReason::NotSmaller {
                    size: meta.len(),
                    best,
                }
            }
            Err(_) => {
                log::info!("Couldn't stat {}, removing from manifest", file.file_name);
                CullReason::Missing
            }
        };
        dropped.push(CullDecision {
            file_name: file.file_name.clone(),
            reason,
        });
    }

    let culled = BuiltImage {
        files: kept,
        ..built.clone()
    };
    (culled, dropped)
}

/// Cull every entry of `manifest` in place. Returns the number of files dropped.
///
/// An entry whose original file did not survive is removed entirely: HTML
/// can't point `src` at it, and the next run will rebuild it.
pub fn cull_manifest(
    manifest: &mut Manifest,
    image_dir: &Path,
    progress: Option<&Sender<ProcessEvent>>,
) -> u32 {
    let mut dropped_files = 0;
    manifest.retain(|slug, built| {
        let (culled, decisions) = cull(image_dir, built);
        dropped_files += decisions.len() as u32;
        for decision in decisions {
            emit(
                progress,
                ProcessEvent::FileCulled {
                    slug: slug.clone(),
                    decision,
                },
            );
        }

        let has_original = culled
            .files
            .iter()
            .any(|f| f.file_name == culled.original_file_name);
        if !has_original {
            log::warn!("Dropping {} from manifest, its original is gone", slug);
            emit(progress, ProcessEvent::EntryDropped { slug: slug.clone() });
            return false;
        }
        *built = culled;
        true
    });
    dropped_files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::types::BuiltImageFile;
    use std::fs;
    use tempfile::TempDir;

    fn settings(widths: &[u32]) -> BuildSettings {
        BuildSettings {
            widths: widths.to_vec(),
            scale_threshold: 0.9,
            quality: Quality::default(),
            overwrite: false,
        }
    }

    struct Site {
        tmp: TempDir,
    }

    impl Site {
        fn new() -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
            }
        }

        fn input(&self) -> PathBuf {
            self.tmp.path().join("in")
        }

        fn images(&self) -> PathBuf {
            self.tmp.path().join("out/img")
        }

        /// Write a source image and return its discovery record.
        fn add(&self, rel: &str, content: &[u8]) -> FoundImage {
            let path = self.input().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            FoundImage {
                digest: crate::identity::digest_file(&path).unwrap(),
                path,
            }
        }
    }

    fn run(
        backend: &MockBackend,
        site: &Site,
        settings: &BuildSettings,
        found: &[FoundImage],
        old: &Manifest,
    ) -> Result<Reconciled, ProcessError> {
        let input = site.input();
        let images = site.images();
        let request = ReconcileRequest {
            input_root: &input,
            image_dir: &images,
            settings,
        };
        reconcile(backend, &request, found, old, None)
    }

    // =========================================================================
    // reconcile
    // =========================================================================

    #[test]
    fn first_run_builds_everything() {
        let site = Site::new();
        let a = site.add("a.png", b"aaa");
        let b = site.add("blog/b.jpg", b"bbb");
        let backend = MockBackend::with_dimensions(&[(&a.path, 1000, 500), (&b.path, 800, 600)]);

        let result = run(&backend, &site, &settings(&[400]), &[a.clone(), b.clone()], &Manifest::empty())
            .unwrap();

        let slug_a = slug(&a.path, &a.digest);
        let slug_b = slug(&b.path, &b.digest);
        assert_eq!(result.manifest.len(), 2);
        assert_eq!(result.path_to_slug["a.png"], slug_a);
        assert_eq!(result.path_to_slug["blog/b.jpg"], slug_b);
        assert_eq!(result.stats.misses, 2);
        assert_eq!(result.stats.hits, 0);
        // 2 originals + 2 variants
        assert_eq!(result.new_files.len(), 4);
        assert!(site.images().join(format!("{slug_a}-400px.png")).exists());
    }

    #[test]
    fn second_run_is_all_cache_hits() {
        let site = Site::new();
        let a = site.add("a.png", b"aaa");
        let backend = MockBackend::with_dimensions(&[(&a.path, 1000, 500)]);
        let first = run(&backend, &site, &settings(&[400]), &[a.clone()], &Manifest::empty()).unwrap();

        let backend = MockBackend::with_dimensions(&[(&a.path, 1000, 500)]);
        let second = run(&backend, &site, &settings(&[400]), &[a], &first.manifest).unwrap();

        assert!(backend.get_operations().is_empty());
        assert_eq!(second.manifest, first.manifest);
        assert!(second.new_files.is_empty());
        assert_eq!(second.stats.hits, 1);
        assert_eq!(second.stats.misses, 0);
    }

    #[test]
    fn content_change_is_a_new_slug() {
        let site = Site::new();
        let v1 = site.add("a.png", b"version 1");
        let backend = MockBackend::with_dimensions(&[(&v1.path, 1000, 500)]);
        let first = run(&backend, &site, &settings(&[]), &[v1.clone()], &Manifest::empty()).unwrap();

        let v2 = site.add("a.png", b"version 2");
        let second = run(&backend, &site, &settings(&[]), &[v2.clone()], &first.manifest).unwrap();

        let old_slug = slug(&v1.path, &v1.digest);
        let new_slug = slug(&v2.path, &v2.digest);
        assert_ne!(old_slug, new_slug);
        assert!(!second.manifest.contains(&old_slug));
        assert!(second.manifest.contains(&new_slug));
        assert_eq!(second.stats.misses, 1);
    }

    #[test]
    fn vanished_images_are_dropped() {
        let site = Site::new();
        let a = site.add("a.png", b"aaa");
        let b = site.add("b.png", b"bbb");
        let backend = MockBackend::with_dimensions(&[(&a.path, 100, 100), (&b.path, 100, 100)]);
        let first =
            run(&backend, &site, &settings(&[]), &[a.clone(), b.clone()], &Manifest::empty()).unwrap();

        let second = run(&backend, &site, &settings(&[]), &[a.clone()], &first.manifest).unwrap();
        assert_eq!(second.manifest.len(), 1);
        assert!(!second.manifest.contains(&slug(&b.path, &b.digest)));
    }

    #[test]
    fn same_image_in_two_places_built_once() {
        let site = Site::new();
        let a = site.add("one/logo.png", b"logo");
        let b = site.add("two/logo.png", b"logo");
        let backend = MockBackend::with_dimensions(&[(&a.path, 100, 100), (&b.path, 100, 100)]);

        let result =
            run(&backend, &site, &settings(&[]), &[a.clone(), b.clone()], &Manifest::empty()).unwrap();

        assert_eq!(result.manifest.len(), 1);
        assert_eq!(result.path_to_slug["one/logo.png"], result.path_to_slug["two/logo.png"]);
        let identifies = backend
            .get_operations()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Identify(_)))
            .count();
        assert_eq!(identifies, 1);
    }

    #[test]
    fn cached_entry_with_missing_original_is_rebuilt() {
        let site = Site::new();
        let a = site.add("a.png", b"aaa");
        let backend = MockBackend::with_dimensions(&[(&a.path, 100, 100)]);
        let first = run(&backend, &site, &settings(&[]), &[a.clone()], &Manifest::empty()).unwrap();

        fs::remove_dir_all(site.images()).unwrap();
        let backend = MockBackend::with_dimensions(&[(&a.path, 100, 100)]);
        let second = run(&backend, &site, &settings(&[]), &[a], &first.manifest).unwrap();

        assert_eq!(second.stats.misses, 1);
        assert_eq!(second.new_files.len(), 1);
        assert_eq!(second.manifest, first.manifest);
    }

    #[test]
    fn build_error_aborts_reconcile() {
        let site = Site::new();
        let good = site.add("good.png", b"good");
        let bad = site.add("bad.png", b"bad");
        // No dimensions for `bad`: identify fails like a corrupt file.
        let backend = MockBackend::with_dimensions(&[(&good.path, 100, 100)]);

        let result = run(&backend, &site, &settings(&[]), &[good, bad], &Manifest::empty());
        assert!(matches!(result, Err(ProcessError::Imaging(_))));
    }

    #[test]
    fn reconcile_emits_progress_events() {
        let site = Site::new();
        let a = site.add("a.png", b"aaa");
        let backend = MockBackend::with_dimensions(&[(&a.path, 1000, 500)]);
        let input = site.input();
        let images = site.images();
        let settings = settings(&[500]);
        let request = ReconcileRequest {
            input_root: &input,
            image_dir: &images,
            settings: &settings,
        };
        let (tx, rx) = std::sync::mpsc::channel();

        reconcile(&backend, &request, &[a.clone()], &Manifest::empty(), Some(&tx)).unwrap();
        drop(tx);

        let events: Vec<ProcessEvent> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        let ProcessEvent::ImageBuilt { files, .. } = &events[0] else {
            panic!("expected ImageBuilt, got {:?}", events[0]);
        };
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.status == FileStatus::Created));
    }

    // =========================================================================
    // optimize
    // =========================================================================

    #[test]
    fn optimize_without_command_is_noop() {
        optimize(&[], &[PathBuf::from("/nope.png")], None).unwrap();
    }

    #[test]
    fn optimize_without_new_files_is_noop() {
        // Would fail if it ran.
        optimize(&["false".to_string()], &[], None).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn optimize_appends_files_to_command() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.png");
        let b = tmp.path().join("b.png");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();

        let command: Vec<String> = ["sh", "-c", "for f; do printf x >> \"$f\"; done", "sh"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        optimize(&command, &[a.clone(), b.clone()], None).unwrap();

        assert_eq!(fs::read_to_string(a).unwrap(), "x");
        assert_eq!(fs::read_to_string(b).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn optimize_nonzero_exit_is_error() {
        let result = optimize(&["false".to_string()], &[PathBuf::from("/x.png")], None);
        assert!(matches!(result, Err(ProcessError::OptimizerFailed { .. })));
    }

    #[test]
    fn optimize_missing_program_is_error() {
        let result = optimize(
            &["enfasten-no-such-optimizer".to_string()],
            &[PathBuf::from("/x.png")],
            None,
        );
        assert!(matches!(result, Err(ProcessError::OptimizerSpawn { .. })));
    }

    // =========================================================================
    // cull
    // =========================================================================

    fn entry(widths: &[u32]) -> BuiltImage {
        BuiltImage {
            original_file_name: format!("x-{}px.png", widths[0]),
            width: widths[0],
            height: widths[0],
            files: widths
                .iter()
                .map(|w| BuiltImageFile {
                    file_name: format!("x-{w}px.png"),
                    width: *w,
                    height: *w,
                })
                .collect(),
        }
    }

    fn write_sizes(dir: &Path, sizes: &[(u32, usize)]) {
        for (w, size) in sizes {
            fs::write(dir.join(format!("x-{w}px.png")), vec![0u8; *size]).unwrap();
        }
    }

    fn kept_widths(built: &BuiltImage) -> Vec<u32> {
        built.files.iter().map(|f| f.width).collect()
    }

    #[test]
    fn cull_keeps_strictly_shrinking_files() {
        let tmp = TempDir::new().unwrap();
        write_sizes(tmp.path(), &[(800, 5000), (400, 2000), (200, 900)]);

        let (culled, dropped) = cull(tmp.path(), &entry(&[800, 400, 200]));
        assert_eq!(kept_widths(&culled), vec![800, 400, 200]);
        assert!(dropped.is_empty());
    }

    #[test]
    fn cull_drops_files_larger_than_a_wider_one() {
        let tmp = TempDir::new().unwrap();
        // The optimizer squeezed the 800px file below the 400px one.
        write_sizes(tmp.path(), &[(800, 1500), (400, 2000), (200, 900)]);

        let (culled, dropped) = cull(tmp.path(), &entry(&[800, 400, 200]));
        assert_eq!(kept_widths(&culled), vec![800, 200]);
        assert_eq!(
            dropped,
            vec![CullDecision {
                file_name: "x-400px.png".into(),
                reason: CullReason::NotSmaller {
                    size: 2000,
                    best: 1500
                },
            }]
        );
    }

    #[test]
    fn cull_drops_equal_sizes() {
        let tmp = TempDir::new().unwrap();
        write_sizes(tmp.path(), &[(800, 1000), (400, 1000)]);

        let (culled, _) = cull(tmp.path(), &entry(&[800, 400]));
        assert_eq!(kept_widths(&culled), vec![800]);
    }

    #[test]
    fn cull_drops_missing_files() {
        let tmp = TempDir::new().unwrap();
        write_sizes(tmp.path(), &[(800, 1000), (200, 100)]);

        let (culled, dropped) = cull(tmp.path(), &entry(&[800, 400, 200]));
        assert_eq!(kept_widths(&culled), vec![800, 200]);
        assert_eq!(dropped[0].reason, CullReason::Missing);
    }

    #[test]
    fn cull_result_is_monotonic() {
        let tmp = TempDir::new().unwrap();
        write_sizes(
            tmp.path(),
            &[(1600, 900), (1200, 950), (800, 600), (600, 600), (400, 300), (200, 350)],
        );

        let (culled, _) = cull(tmp.path(), &entry(&[1600, 1200, 800, 600, 400, 200]));
        let sizes: Vec<u64> = culled
            .files
            .iter()
            .map(|f| fs::metadata(tmp.path().join(&f.file_name)).unwrap().len())
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] > w[1]), "sizes {sizes:?}");
        assert_eq!(kept_widths(&culled), vec![1600, 800, 400]);
    }

    #[test]
    fn cull_manifest_drops_entries_without_original() {
        let tmp = TempDir::new().unwrap();
        write_sizes(tmp.path(), &[(400, 100)]);
        let mut manifest = Manifest::empty();
        manifest.insert("x-00000000".into(), entry(&[800, 400]));

        let dropped = cull_manifest(&mut manifest, tmp.path(), None);
        assert_eq!(dropped, 1);
        assert!(manifest.is_empty());
    }

    #[test]
    fn cull_manifest_updates_entries_in_place() {
        let tmp = TempDir::new().unwrap();
        write_sizes(tmp.path(), &[(800, 100), (400, 200)]);
        let mut manifest = Manifest::empty();
        manifest.insert("x-00000000".into(), entry(&[800, 400]));

        let (tx, rx) = std::sync::mpsc::channel();
        let dropped = cull_manifest(&mut manifest, tmp.path(), Some(&tx));
        drop(tx);

        assert_eq!(dropped, 1);
        assert_eq!(kept_widths(manifest.get("x-00000000").unwrap()), vec![800]);
        assert!(matches!(
            rx.iter().next(),
            Some(ProcessEvent::FileCulled { .. })
        ));
    }
}
