//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Images are identified by their slug, the name their outputs carry. The
//! input path is secondary context on an indented `Source:` line, so the
//! output reads as an inventory of built images while still tracing back to
//! files.
//!
//! # Output Format
//!
//! ## Build progress
//!
//! ```text
//! sunset-9f86d081
//!     Source: photos/sunset.jpg
//!     1600px (original): created
//!     800px: created
//! logo-0badf00d: cached
//!     Source: logo.png
//! Optimizing 2 new files
//! Culled sunset-9f86d081-800px.jpg (41210 bytes, a wider file is 40112)
//! ```
//!
//! ## Build summary
//!
//! ```text
//! Images: 2 discovered, 1 cached, 1 built (2 total), 1 culled
//! Pages: 3 HTML files, 2 tags rewritten, 7 files copied
//! Removed 1 stale path
//!     old-post/index.html
//! ```
//!
//! ## Check
//!
//! ```text
//! photos/sunset.jpg → sunset-9f86d081 (would build)
//! logo.png → logo-0badf00d (cached)
//!
//! 1 cached, 1 to build
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::pipeline::{BuildReport, CheckEntry, CheckStatus};
use crate::process::{CullReason, FileStatus, ProcessEvent};
use std::path::Path;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Build progress
// ============================================================================

/// Format a single progress event.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::ImageCached { slug, source_path } => vec![
            format!("{}: cached", slug),
            format!("{}Source: {}", indent(1), source_path),
        ],
        ProcessEvent::ImageBuilt {
            slug,
            source_path,
            files,
        } => {
            let mut lines = vec![
                slug.clone(),
                format!("{}Source: {}", indent(1), source_path),
            ];
            for (i, file) in files.iter().enumerate() {
                let label = if i == 0 {
                    format!("{}px (original)", file.width)
                } else {
                    format!("{}px", file.width)
                };
                let status = match file.status {
                    FileStatus::Created => "created",
                    FileStatus::Existing => "existing",
                };
                lines.push(format!("{}{}: {}", indent(1), label, status));
            }
            lines
        }
        ProcessEvent::OptimizerStarted { file_count } => {
            vec![format!("Optimizing {}", plural(*file_count, "new file", "new files"))]
        }
        ProcessEvent::FileCulled { decision, .. } => match decision.reason {
            CullReason::Missing => vec![format!("Culled {} (missing)", decision.file_name)],
            CullReason::NotSmaller { size, best } => vec![format!(
                "Culled {} ({} bytes, a wider file is {})",
                decision.file_name, size, best
            )],
        },
        ProcessEvent::EntryDropped { slug } => {
            vec![format!("Dropped {}: original is gone, will rebuild next run", slug)]
        }
    }
}

// ============================================================================
// Build summary
// ============================================================================

/// Format the end-of-build summary. Removed paths are shown relative to the
/// output root.
pub fn format_build_report(report: &BuildReport, output_root: &Path) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Images: {} discovered, {}",
            report.discovered, report.stats
        ),
        format!(
            "Pages: {}, {} rewritten, {} copied",
            plural(report.rewrite.html_files, "HTML file", "HTML files"),
            plural(report.rewrite.rewritten_tags, "tag", "tags"),
            plural(report.rewrite.copied_files, "file", "files"),
        ),
    ];

    if !report.removed.is_empty() {
        lines.push(format!(
            "Removed {}",
            plural(report.removed.len(), "stale path", "stale paths")
        ));
        for path in &report.removed {
            let shown = path.strip_prefix(output_root).unwrap_or(path);
            lines.push(format!("{}{}", indent(1), shown.display()));
        }
    }
    lines
}

pub fn print_build_report(report: &BuildReport, output_root: &Path) {
    for line in format_build_report(report, output_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the dry-run listing.
pub fn format_check_output(entries: &[CheckEntry]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut cached = 0;

    for entry in entries {
        let status = match entry.status {
            CheckStatus::Cached => {
                cached += 1;
                "cached"
            }
            CheckStatus::WouldBuild => "would build",
        };
        lines.push(format!(
            "{} \u{2192} {} ({})",
            entry.source_path, entry.slug, status
        ));
    }

    if entries.is_empty() {
        lines.push("No images found".to_string());
    } else {
        lines.push(String::new());
        lines.push(format!("{} cached, {} to build", cached, entries.len() - cached));
    }
    lines
}

pub fn print_check_output(entries: &[CheckEntry]) {
    for line in format_check_output(entries) {
        println!("{}", line);
    }
}
