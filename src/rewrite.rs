//! HTML rewriting and site mirroring.
//!
//! Mirrors the input tree into the output tree. Non-HTML files are copied
//! byte for byte; `.html`/`.htm` files have their `<img>` tags rewritten to
//! point at the built images with a `srcset`.
//!
//! ## Markup contract
//!
//! Tags are found with a regular expression, not an HTML parser:
//!
//! ```text
//! <img ([^>]*)src="([^"]+)"([^>]*)>
//! ```
//!
//! That covers what static site generators emit. It does not cover
//! single-quoted or unquoted `src`, a `>` inside an attribute value, or
//! `<img` followed by anything but a single space. Such tags pass through
//! unchanged.
//!
//! A `src` starting with `/` is resolved against the site root, anything else
//! against the HTML file's directory. References that don't resolve to a
//! discovered image are left alone.
//!
//! Written URLs have `%`, `"`, `,` and whitespace percent-encoded so a file
//! name like `my photo, 2.jpg` can't split a `srcset` candidate. A `"` in the
//! configured `sizes` value is written as `&quot;`.
//!
//! ```text
//! <img class="x" src="/assets/a.png">
//!   ↓
//! <img class="x" src="/assets/images/a-1a2b-original.png"
//!      srcset="/assets/images/a-1a2b-original.png 200w, /assets/images/a-1a2b-100px.png 100w">
//! ```

use crate::gc::Whitelist;
use crate::identity::relative_key;
use crate::manifest::Manifest;
use crate::types::{BuiltImage, PathToSlug};
use regex::bytes::{Captures, Regex};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to walk {0}")]
    Walk(#[from] walkdir::Error),
}

static IMG_TAG_RE: OnceLock<Regex> = OnceLock::new();

fn img_tag_re() -> &'static Regex {
    IMG_TAG_RE.get_or_init(|| {
        // Byte-oriented so HTML that isn't valid UTF-8 still rewrites.
        Regex::new(r#"(?-u)<img ([^>]*)src="([^"]+)"([^>]*)>"#).expect("img tag regex is valid")
    })
}

/// Counters for one rewrite pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteStats {
    pub html_files: usize,
    pub copied_files: usize,
    pub rewritten_tags: usize,
}

/// What [`rewrite_site`] produced.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// Every output path written, with ancestors.
    pub whitelist: Whitelist,
    pub stats: RewriteStats,
}

/// Everything needed to rewrite a tag.
#[derive(Debug, Clone)]
pub struct RewriteContext<'a> {
    manifest: &'a Manifest,
    path_to_slug: &'a PathToSlug,
    url_prefix: String,
    sizes_attr: &'a str,
}

impl<'a> RewriteContext<'a> {
    /// `image_folder` is the image directory relative to the output root, as
    /// it should appear in URLs.
    pub fn new(
        manifest: &'a Manifest,
        path_to_slug: &'a PathToSlug,
        image_folder: &str,
        sizes_attr: &'a str,
    ) -> Self {
        let folder = image_folder.replace('\\', "/");
        let folder = folder.trim_matches('/');
        let url_prefix = if folder.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", url_escape(folder))
        };
        Self {
            manifest,
            path_to_slug,
            url_prefix,
            sizes_attr,
        }
    }

    fn lookup(&self, dir_key: &str, src: &[u8]) -> Option<&'a BuiltImage> {
        let src = std::str::from_utf8(src).ok()?;
        let key = resolve_reference(dir_key, src)?;
        let slug = self.path_to_slug.get(&key)?;
        self.manifest.get(slug)
    }

    fn render(&self, caps: &Captures<'_>, built: &BuiltImage) -> Vec<u8> {
        let mut tag = Vec::with_capacity(caps[0].len() * 2);
        tag.extend_from_slice(b"<img ");
        tag.extend_from_slice(&caps[1]);
        tag.extend_from_slice(
            format!(
                r#"src="{}{}""#,
                self.url_prefix,
                url_escape(&built.original_file_name)
            )
            .as_bytes(),
        );
        if built.files.len() > 1 {
            let srcset = built
                .files
                .iter()
                .map(|f| format!("{}{} {}w", self.url_prefix, url_escape(&f.file_name), f.width))
                .collect::<Vec<_>>()
                .join(", ");
            tag.extend_from_slice(format!(r#" srcset="{srcset}""#).as_bytes());
            if !self.sizes_attr.is_empty() {
                tag.extend_from_slice(
                    format!(r#" sizes="{}""#, self.sizes_attr.replace('"', "&quot;")).as_bytes(),
                );
            }
        }
        tag.extend_from_slice(&caps[3]);
        tag.push(b'>');
        tag
    }

    /// Rewrite every known `<img>` in `html`.
    ///
    /// `dir_key` is the input-relative directory of the HTML file (`""` at the
    /// root). Returns the new document and the number of tags rewritten.
    pub fn rewrite_html(&self, html: &[u8], dir_key: &str) -> (Vec<u8>, usize) {
        let mut rewritten = 0;
        let out = img_tag_re().replace_all(html, |caps: &Captures<'_>| {
            match self.lookup(dir_key, &caps[2]) {
                Some(built) => {
                    rewritten += 1;
                    self.render(caps, built)
                }
                None => caps[0].to_vec(),
            }
        });
        (out.into_owned(), rewritten)
    }
}

/// Percent-encode the characters that would end a URL inside `src` or split
/// a `srcset` candidate.
fn url_escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, '%' | '"' | ',') || c.is_ascii_whitespace() {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Resolve an `src` value to an input-relative key.
///
/// `.` and `..` are collapsed lexically. Returns `None` for references that
/// climb above the site root.
pub fn resolve_reference(dir_key: &str, src: &str) -> Option<String> {
    let joined = match src.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None if dir_key.is_empty() => src.to_string(),
        None => format!("{dir_key}/{src}"),
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

/// Mirror `input_root` into `output_root`, rewriting HTML on the way.
pub fn rewrite_site(
    input_root: &Path,
    output_root: &Path,
    context: &RewriteContext<'_>,
) -> Result<RewriteOutcome, RewriteError> {
    let mut whitelist = Whitelist::new(output_root);
    let mut stats = RewriteStats::default();

    fs::create_dir_all(output_root)?;

    for entry in WalkDir::new(input_root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Some(rel) = relative_key(input_root, entry.path()) else {
            continue;
        };
        let target = output_root.join(&rel);

        // Directories exist in the output only as parents of written files.
        if entry.file_type().is_dir() {
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if is_html(entry.path()) {
            let dir_key = rel.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            let html = fs::read(entry.path())?;
            let (out, rewritten) = context.rewrite_html(&html, dir_key);
            log::debug!("Rewrote {} image tags in {}", rewritten, rel);
            fs::write(&target, out)?;
            stats.html_files += 1;
            stats.rewritten_tags += rewritten;
        } else {
            fs::copy(entry.path(), &target)?;
            stats.copied_files += 1;
        }
        whitelist.insert(&target);
    }

    log::info!(
        "Mirrored {} HTML files ({} tags rewritten) and {} other files",
        stats.html_files,
        stats.rewritten_tags,
        stats.copied_files
    );

    Ok(RewriteOutcome { whitelist, stats })
}
