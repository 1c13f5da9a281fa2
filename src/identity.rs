//! Content identity for source images.
//!
//! Every source image is identified by a **slug**: its file stem plus the
//! first four bytes of the SHA-256 of its contents, hex encoded.
//!
//! ```text
//! _site/blog/2019/sunset.jpg  →  sunset-9f86d081
//! ```
//!
//! The slug is the manifest key, so the cache is content-addressed: moving an
//! image to another directory keeps its slug, while editing a single byte
//! produces a new one. Content hashing rather than mtimes means the cache
//! survives `git checkout` and CI restores, which reset modification times.
//!
//! Four bytes is enough for the corpus sizes this targets: about 2900 images
//! sharing one file name give a 0.1% collision chance.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Component, Path};

/// Number of digest bytes that end up in a slug.
const SLUG_DIGEST_BYTES: usize = 4;

/// SHA-256 of a file's contents, streamed rather than read into memory.
pub fn digest_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

/// Derive the slug for an image from its path and content digest.
pub fn slug(path: &Path, digest: &[u8]) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let fragment: String = digest
        .iter()
        .take(SLUG_DIGEST_BYTES)
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{stem}-{fragment}")
}

/// `path` relative to `root`, joined with `/` regardless of platform.
///
/// Returns `None` when `path` is not inside `root`. This is the key format
/// used for path → slug lookups, matching how HTML references images.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}
